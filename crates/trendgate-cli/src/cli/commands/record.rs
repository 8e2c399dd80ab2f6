use super::common;
use crate::cli::args::RecordArgs;
use crate::exit_codes::SUCCESS;
use crate::transport::DatabaseHandle;

pub async fn run(args: RecordArgs) -> anyhow::Result<i32> {
    let cfg = common::load(&args.common)?;
    let registry = cfg.registry()?;
    let collected = args.build.collected(&registry)?;
    let context = args.build.context();
    context.validate()?;

    let mut db = DatabaseHandle::checkout(&cfg.database).await?;
    let recorded = {
        let store = db.open()?;
        store.record_run(&context, &collected)?
    };
    db.publish().await?;

    println!(
        "recorded build {} ({} on {}): {} metrics",
        recorded.build_id,
        context.commit_sha,
        context.branch,
        recorded.definitions.len()
    );
    Ok(SUCCESS)
}
