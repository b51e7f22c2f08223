use log::error;
use std::process;
use wacky_vectors::Pipeline;

fn main() {

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = Pipeline::run() {
        error!("{}", e);
        process::exit(1);
    }
}
