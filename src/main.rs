use std::process::ExitCode;

mod app;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    app::run().await
}
