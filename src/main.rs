use std::env;

use fitreport_offline::cli;

#[tokio::main]
async fn main() -> fitreport_offline::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let (command, options) = match cli::parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("Error: {message}");
            eprintln!();
            cli::print_usage();
            std::process::exit(2);
        }
    };

    cli::run(command, &options).await
}
