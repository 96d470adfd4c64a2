mod cli;
mod constants;
mod context;
mod driver;
mod error;
mod ignore;
mod p4;
mod plan;
mod status;
mod ui;
mod ztag;

use crate::cli::Cli;
use crate::constants::EXIT_FAILURE;
use crate::context::Context;
use crate::driver::Outcome;
use crate::error::Fatal;
use crate::p4::P4;
use crate::status::{Action, Buckets, Inspection, Status};
use anyhow::{Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use num_format::{Locale, ToFormattedString};
use std::io::IsTerminal;
use std::path::Path;

fn main() {
    match run() {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            let code = e
                .downcast_ref::<Fatal>()
                .map_or(EXIT_FAILURE, Fatal::exit_code);
            std::process::exit(code);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse_args();
    ui::set_verbose(cli.verbose);

    // sanity checks
    let interactive = !cli.status && !cli.dry_run;
    if interactive && (!std::io::stdin().is_terminal() || !std::io::stdout().is_terminal()) {
        bail!("interactive terminal required to edit the plan (try --status or --dry-run)");
    }

    let ctx = Context::discover(&cli.p4)?;
    debug!("client {} rooted at {}", ctx.client, ctx.root);
    let p4 = P4::new(&ctx);

    // main
    let inspection = inspect(&ctx, &p4)?;
    let buckets = inspection.buckets;

    if cli.status {
        if cli.json {
            info!(serde_json::to_string_pretty(&buckets)?);
        } else {
            print_summary(&ctx, inspection.scanned);
            print_status(&ctx, &buckets);
        }
        return Ok(0);
    }

    print_summary(&ctx, inspection.scanned);

    if cli.diff {
        let modified = buckets.paths_with(&Status::Diff);
        if modified.is_empty() {
            status!("no modified files to diff");
        } else {
            p4.page_diff(&modified, &driver::pager())?;
        }
    }

    let plan_path = plan::plan_path(&ctx);
    match stage_plan(&ctx, &buckets, cli.dry_run, &plan_path)? {
        Staged::Nothing => {
            status!("nothing to reconcile");
            print_actions(&ctx, "already opened:", &buckets.opened);
            Ok(0)
        }
        Staged::DryRun(script) => {
            info!(script.trim_end());
            Ok(0)
        }
        Staged::Written => {
            let outcome = driver::run(&plan_path, &driver::editor(), Path::new(&ctx.root))?;
            Ok(report(outcome, &plan_path))
        }
    }
}

/// what became of the plan before the editor
#[derive(Debug, PartialEq, Eq)]
enum Staged {
    /// nothing to reconcile; no plan was rendered or written
    Nothing,
    /// rendered for printing only
    DryRun(String),
    /// written to the plan path, ready for the editor
    Written,
}

fn stage_plan(ctx: &Context, buckets: &Buckets, dry_run: bool, plan_path: &Path) -> Result<Staged> {
    if !buckets.needs_plan() {
        return Ok(Staged::Nothing);
    }

    let script = plan::render(ctx, buckets)?;
    if dry_run {
        return Ok(Staged::DryRun(script));
    }

    plan::write(plan_path, &script)?;
    Ok(Staged::Written)
}

/// inspect with a spinner on stderr
fn inspect(ctx: &Context, p4: &P4) -> Result<Inspection> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .expect("invalid spinner template"),
    );
    spinner.set_message(format!("checking {}...", ctx.client));
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let result = status::inspect(ctx, p4);

    spinner.finish_and_clear();
    result
}

fn print_summary(ctx: &Context, scanned: usize) {
    let file_word = if scanned == 1 { "file" } else { "files" };
    status!(
        "scanned {} {} under {}",
        scanned.to_formatted_string(&Locale::en),
        file_word,
        ctx.root
    );
}

/// classification listing for --status
fn print_status(ctx: &Context, buckets: &Buckets) {
    if !buckets.needs_plan() && buckets.opened.is_empty() {
        status!("nothing to reconcile");
        return;
    }
    print_actions(ctx, "needs add/edit/delete:", &buckets.edit);
    print_actions(ctx, "unchanged, can be reverted:", &buckets.revert);
    print_actions(ctx, "already opened:", &buckets.opened);
}

fn print_actions(ctx: &Context, title: &str, actions: &[Action]) {
    if actions.is_empty() {
        return;
    }
    status!(title);
    for action in actions {
        let command = action.command.map_or("-", |command| command.as_str());
        info!(
            "  {:<16} {:<7} {}",
            action.status.to_string(),
            command,
            ctx.relative(&action.path)
        );
    }
}

fn report(outcome: Outcome, plan_path: &Path) -> i32 {
    match outcome {
        Outcome::EditorFailed => warning!("editor failed, nothing was run"),
        Outcome::NotSaved => warning!("plan not saved, nothing was run"),
        Outcome::Completed => status!("plan completed"),
        Outcome::Failed(code) => {
            let code = code.map_or_else(|| "signal".to_string(), |code| code.to_string());
            error!("plan failed (exit {}), some commands may have run", code);
        }
    }

    if outcome.keeps_plan() {
        info!("plan kept at {}", plan_path.display());
    }
    exit_code(outcome)
}

/// cancelling is not a failure; a plan that ran and failed is
fn exit_code(outcome: Outcome) -> i32 {
    match outcome {
        Outcome::EditorFailed | Outcome::NotSaved | Outcome::Completed => 0,
        Outcome::Failed(_) => EXIT_FAILURE,
    }
}
