use clap::Parser;

mod cli;
pub mod exit_codes;
pub mod transport;

use cli::args::Cli;
use cli::commands::dispatch;
use trendgate_core::errors::Diagnostic;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
    let cli = Cli::parse();
    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => match e.downcast_ref::<trendgate_core::Error>() {
            Some(err) => {
                eprint!("{}", Diagnostic::from_error(err).format_terminal());
                exit_codes::for_error(err)
            }
            None => {
                eprintln!("fatal: {e:?}");
                exit_codes::USER_ERROR
            }
        },
    };
    std::process::exit(code);
}
