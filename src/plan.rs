use crate::constants::PLAN_FILE_PREFIX;
use crate::context::Context;
use crate::p4::escape;
use crate::status::{Action, Buckets, Status};
use anyhow::{Context as _, Result, anyhow};
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

/// how a section's paths are written into the command
#[derive(Clone, Copy)]
enum PathForm {
    /// as on disk (`p4 add -f`, `rm`)
    Raw,
    /// with perforce's reserved characters escaped
    Escaped,
}

/// render the buckets as an editable shell script
///
/// one command per section with the paths on continuation lines; alternatives the
/// user may prefer are included commented out
pub fn render(ctx: &Context, buckets: &Buckets) -> Result<String> {
    let mut out = String::new();
    let p4 = format!("{} -c {}", quote(&ctx.p4)?, quote(&ctx.client)?);

    let _ = writeln!(out, "#!/bin/sh");
    let _ = writeln!(
        out,
        "# p4-reconcile plan for client {} at {}",
        comment_text(&ctx.client),
        comment_text(&ctx.root)
    );
    let _ = writeln!(out, "#");
    let _ = writeln!(out, "# save this file to run it, quit without saving to cancel.");
    let _ = writeln!(out, "# delete or comment out lines to leave files alone.");
    let _ = writeln!(out);
    let _ = writeln!(out, "set -e");
    let _ = writeln!(out, "cd {}", quote(&ctx.root)?);

    let new = relative_paths(ctx, &buckets.edit, &Status::New);
    let diff = relative_paths(ctx, &buckets.edit, &Status::Diff);
    let missing = relative_paths(ctx, &buckets.edit, &Status::Missing);
    let undo: Vec<&str> = {
        let mut undo: Vec<&str> = diff.iter().chain(&missing).copied().collect();
        undo.sort_unstable();
        undo
    };
    let revert: Vec<&str> = buckets
        .revert
        .iter()
        .map(|action| ctx.relative(&action.path))
        .collect();

    let sections = [
        ("add new files", false, format!("{p4} add -f"), &new, PathForm::Raw),
        ("or remove them locally", true, "rm -f".to_string(), &new, PathForm::Raw),
        ("check out modified files", false, format!("{p4} edit"), &diff, PathForm::Escaped),
        ("mark missing files deleted", false, format!("{p4} delete"), &missing, PathForm::Escaped),
        ("or undo the local changes", true, format!("{p4} sync -f"), &undo, PathForm::Escaped),
        ("revert unchanged files", false, format!("{p4} revert"), &revert, PathForm::Escaped),
    ];
    for (title, commented, command, paths, form) in sections {
        section(&mut out, title, commented, &command, paths, form)?;
    }

    if !buckets.opened.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "# already opened");
        for action in &buckets.opened {
            let _ = writeln!(
                out,
                "#   {:<10} {}",
                comment_text(opened_action(action)),
                comment_text(ctx.relative(&action.path))
            );
        }
    }

    Ok(out)
}

fn section(
    out: &mut String,
    title: &str,
    commented: bool,
    command: &str,
    paths: &[&str],
    form: PathForm,
) -> Result<()> {
    if paths.is_empty() {
        return Ok(());
    }

    let prefix = if commented { "# " } else { "" };
    let _ = writeln!(out);
    let _ = writeln!(out, "# {title}");
    let _ = write!(out, "{prefix}{command}");
    for path in paths {
        let path = match form {
            PathForm::Raw => quote(path)?,
            PathForm::Escaped => quote(&escape(path))?,
        };
        let _ = write!(out, " \\\n{prefix}    {path}");
    }
    let _ = writeln!(out);
    Ok(())
}

fn relative_paths<'a>(ctx: &Context, actions: &'a [Action], status: &Status) -> Vec<&'a str> {
    actions
        .iter()
        .filter(|action| &action.status == status)
        .map(|action| ctx.relative(&action.path))
        .collect()
}

fn opened_action(action: &Action) -> &str {
    match &action.status {
        Status::OpenedFor(name) => name,
        _ => "",
    }
}

/// text for a `#` comment line; control characters could end the comment
fn comment_text(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { '?' } else { c })
        .collect()
}

fn quote(text: &str) -> Result<String> {
    shlex::try_quote(text)
        .map(|quoted| quoted.into_owned())
        .map_err(|e| anyhow!("cannot quote {text:?} for the plan: {e}"))
}

/// fixed per-user plan location, overwritten on every run
pub fn plan_path(ctx: &Context) -> PathBuf {
    let user: String = ctx
        .user
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(format!("{PLAN_FILE_PREFIX}-{user}.sh"))
}

/// write the plan as a fresh file, replacing whatever sits at `path`
///
/// an old plan (or a symlink planted in a shared temp dir) is removed first and the
/// new file is created exclusively, so the write never follows a link
pub fn write(path: &Path, script: &str) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("failed to remove old plan {}", path.display()));
        }
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("failed to create plan {}", path.display()))?;
    file.write_all(script.as_bytes())
        .with_context(|| format!("failed to write plan to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Command;
    use tempfile::TempDir;

    fn context() -> Context {
        Context {
            p4: "p4".to_string(),
            client: "dev".to_string(),
            root: "/ws".to_string(),
            user: "alice".to_string(),
            config_file: None,
        }
    }

    fn action(status: Status, command: Option<Command>, path: &str) -> Action {
        Action {
            status,
            command,
            path: path.to_string(),
        }
    }

    #[test]
    fn test_render_all_sections() {
        let buckets = Buckets {
            edit: vec![
                action(Status::Diff, Some(Command::Edit), "/ws/b.txt"),
                action(Status::Missing, Some(Command::Delete), "/ws/gone.txt"),
                action(Status::New, Some(Command::Add), "/ws/src/new.rs"),
            ],
            revert: vec![action(Status::Unchanged, Some(Command::Revert), "/ws/c.txt")],
            opened: vec![action(Status::OpenedFor("edit".into()), None, "/ws/a.txt")],
        };

        let script = render(&context(), &buckets).unwrap();

        let expected = "\
#!/bin/sh
# p4-reconcile plan for client dev at /ws
#
# save this file to run it, quit without saving to cancel.
# delete or comment out lines to leave files alone.

set -e
cd /ws

# add new files
p4 -c dev add -f \\
    src/new.rs

# or remove them locally
# rm -f \\
#     src/new.rs

# check out modified files
p4 -c dev edit \\
    b.txt

# mark missing files deleted
p4 -c dev delete \\
    gone.txt

# or undo the local changes
# p4 -c dev sync -f \\
#     b.txt \\
#     gone.txt

# revert unchanged files
p4 -c dev revert \\
    c.txt

# already opened
#   edit       a.txt
";
        assert_eq!(script, expected);
    }

    #[test]
    fn test_empty_sections_are_omitted() {
        let buckets = Buckets {
            revert: vec![action(Status::Unchanged, Some(Command::Revert), "/ws/c.txt")],
            ..Buckets::default()
        };
        let script = render(&context(), &buckets).unwrap();
        assert!(script.contains("revert unchanged files"));
        assert!(!script.contains("add -f"));
        assert!(!script.contains("edit"));
        assert!(!script.contains("already opened"));
    }

    #[test]
    fn test_reserved_characters_are_escaped_except_for_add() {
        let buckets = Buckets {
            edit: vec![
                action(Status::Diff, Some(Command::Edit), "/ws/v@2.txt"),
                action(Status::New, Some(Command::Add), "/ws/n#1.txt"),
            ],
            ..Buckets::default()
        };
        let script = render(&context(), &buckets).unwrap();
        assert!(script.contains("v%402.txt"));
        assert!(!script.contains("v@2.txt"));
        assert!(script.contains("n#1.txt"));
        assert!(!script.contains("n%231.txt"));
    }

    #[test]
    fn test_paths_with_spaces_are_quoted() {
        let buckets = Buckets {
            edit: vec![action(Status::Diff, Some(Command::Edit), "/ws/my file.txt")],
            ..Buckets::default()
        };
        let script = render(&context(), &buckets).unwrap();
        assert!(script.contains("'my file.txt'"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let buckets = Buckets {
            edit: vec![action(Status::New, Some(Command::Add), "/ws/x")],
            ..Buckets::default()
        };
        assert_eq!(
            render(&context(), &buckets).unwrap(),
            render(&context(), &buckets).unwrap()
        );
    }

    #[test]
    fn test_control_characters_stay_inside_comments() {
        let mut ctx = context();
        ctx.client = "dev\ntouch pwned".to_string();
        let buckets = Buckets {
            opened: vec![action(
                Status::OpenedFor("edit".into()),
                None,
                "/ws/a\nrm -rf x",
            )],
            ..Buckets::default()
        };

        let script = render(&ctx, &buckets).unwrap();
        println!("{script}");
        for line in script.lines() {
            assert!(
                !line.starts_with("touch") && !line.starts_with("rm"),
                "live line leaked: {line}"
            );
        }
        assert!(script.contains("# p4-reconcile plan for client dev?touch pwned at /ws\n"));
        assert!(script.contains("#   edit       a?rm -rf x\n"));
    }

    #[test]
    fn test_write_replaces_existing_plan() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.sh");
        fs::write(&path, "old plan, much longer than the new one\n").unwrap();

        write(&path, "new\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_write_does_not_follow_symlinks() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("victim.txt");
        let path = dir.path().join("plan.sh");
        fs::write(&target, "precious\n").unwrap();
        std::os::unix::fs::symlink(&target, &path).unwrap();

        write(&path, "plan\n").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "precious\n");
        assert!(!fs::symlink_metadata(&path).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&path).unwrap(), "plan\n");
    }

    #[test]
    fn test_plan_path_is_per_user() {
        let mut ctx = context();
        ctx.user = "dom\\bob".to_string();
        let path = plan_path(&ctx);
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "p4-reconcile-dom_bob.sh"
        );
    }
}
