use trendgate_core::report::{build_report, write_report, ReportOptions};

use super::common;
use crate::cli::args::ReportArgs;
use crate::exit_codes::SUCCESS;
use crate::transport::DatabaseHandle;

pub async fn run(args: ReportArgs) -> anyhow::Result<i32> {
    let mut cfg = common::load(&args.common)?;
    if args.all_branches {
        cfg.report.all_branches = true;
    } else if let Some(branch) = args.branch {
        cfg.report.all_branches = false;
        cfg.report.branch = Some(branch);
    }
    let options = ReportOptions {
        branch: cfg.report_branch(),
        repository: args.repository.or(cfg.report.repository),
        fill_gaps: cfg.report.fill_gaps && !args.no_fill_gaps,
        ..ReportOptions::default()
    };
    let out = args.out.unwrap_or(cfg.report.output);

    // Read-only: the checkout is never published.
    let db = DatabaseHandle::checkout(&cfg.database).await?;
    let html = {
        let store = db.open()?;
        build_report(&store, &options)?
    };
    write_report(&out, &html)?;

    println!("wrote report to {}", out.display());
    Ok(SUCCESS)
}
