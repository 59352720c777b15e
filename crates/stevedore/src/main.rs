use clap::Parser;

mod cli;
mod commands;

#[tokio::main]
async fn main() {
    let parsed = cli::Cli::parse();
    let exit_code = parsed.dispatch().await;
    std::process::exit(exit_code);
}
