use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use vpn_account_api::db;
use vpn_account_api::sqlite_repo::SqliteRepository;
use vpn_account_api::voucher::generate_vouchers;

#[derive(Debug, Parser)]
#[command(name = "generate-vouchers", about = "Create single-use voucher codes")]
struct Args {
    /// Number of codes to create.
    #[arg(short, long, default_value_t = 10_000)]
    count: usize,

    /// Months of service each code is worth.
    #[arg(short, long, default_value_t = 3)]
    months: i64,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:vpn-account-api.db")]
    database_url: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let pool = match db::init_pool(&args.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to initialize database: {e}");
            return ExitCode::FAILURE;
        }
    };
    let repo = SqliteRepository::new(pool);

    let codes = match generate_vouchers(&repo, args.count, args.months).await {
        Ok(codes) => codes,
        Err(e) => {
            tracing::error!("Voucher generation failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(count = codes.len(), months = args.months, "Vouchers created");

    let mut out = BufWriter::new(io::stdout().lock());
    for code in &codes {
        if writeln!(out, "{code}").is_err() {
            return ExitCode::FAILURE;
        }
    }
    if out.flush().is_err() {
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
