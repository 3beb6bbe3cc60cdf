use std::{env, fs, process::ExitCode, time::Instant};

use skiff::{Context, FsLoader, Runtime};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let Some(file_path) = args.get(1) else {
        eprintln!("usage: skiff <script.js>");
        return ExitCode::FAILURE;
    };
    let source = match read_file(file_path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    ctx.set_module_loader(Box::new(FsLoader));

    let start = Instant::now();
    match ctx.eval(file_path, &source) {
        Ok(value) => {
            let elapsed = start.elapsed();
            eprintln!("done in {elapsed:?}");
            if !matches!(value, skiff::Value::Undefined) {
                println!("{}", ctx.display(&value));
            }
            ExitCode::SUCCESS
        }
        Err(exception) => {
            eprintln!("Uncaught {exception}");
            ExitCode::FAILURE
        }
    }
}

fn read_file(file_path: &str) -> Result<String, String> {
    match fs::metadata(file_path) {
        Ok(metadata) => {
            if !metadata.is_file() {
                return Err(format!("{file_path} is not a file"));
            }
        }
        Err(err) => {
            return Err(format!("cannot stat {file_path}: {err}"));
        }
    }
    fs::read_to_string(file_path).map_err(|err| format!("cannot read {file_path}: {err}"))
}
