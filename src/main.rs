use std::process::ExitCode;

use integration_launcher::config::LauncherConfig;
use integration_launcher::launcher::error::LaunchError;
use integration_launcher::launcher::Launcher;
use integration_launcher::utils::exit_code_byte;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // stdout은 애플리케이션 몫 — 런처 로그는 stderr로
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("Integration launcher starting");

    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("[{}] {}", e.error_code(), e);
            e.exit_code()
        }
    };
    ExitCode::from(exit_code_byte(code))
}

async fn run() -> Result<i32, LaunchError> {
    let config = LauncherConfig::load()?;
    Launcher::new(&config).run().await
}
