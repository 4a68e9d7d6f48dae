use std::collections::HashMap;
use std::io::{BufRead, BufReader, Lines, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Output, Stdio};
use tracing::{debug, warn};

use super::{Commit, CommitIds, CommitRange, DiffOptions, Repository, WalkOrder};
use crate::error::{EventcError, Result};
use crate::event::Author;
use crate::paths::rename_display;

/// A repository read through the `git` command line.
#[derive(Debug, Clone)]
pub struct GitRepository {
    path: PathBuf,
    git_dir: PathBuf,
    bare: bool,
}

/// A `git` command bound to `git_dir`, ignoring any `GIT_DIR` inherited from
/// the hook environment.
fn git_command(git_dir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.arg("--git-dir").arg(git_dir);
    cmd.env_remove("GIT_DIR");
    cmd.env_remove("GIT_WORK_TREE");
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd
}

fn describe(args: &[&str]) -> String {
    format!("git {}", args.join(" "))
}

fn check_output(output: Output, args: &[&str]) -> Result<Output> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(EventcError::GitCommandFailed {
            command: describe(args),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

impl GitRepository {
    /// Opens the repository containing `path`, bare or not.
    pub fn open(path: &Path) -> Result<Self> {
        let args = ["rev-parse", "--is-bare-repository", "--absolute-git-dir"];
        let output = Command::new("git")
            .current_dir(path)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()?;
        let output = check_output(output, &args)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines();

        let bare = lines.next().map(str::trim) == Some("true");
        let git_dir = lines
            .next()
            .map(|line| PathBuf::from(line.trim()))
            .ok_or_else(|| EventcError::GitCommandFailed {
                command: describe(&args),
                stderr: "no git directory reported".to_string(),
            })?;

        let path = if bare {
            git_dir.clone()
        } else {
            git_dir.parent().unwrap_or(&git_dir).to_path_buf()
        };
        debug!("Opened repository {} (bare: {})", path.display(), bare);

        Ok(Self {
            path,
            git_dir,
            bare,
        })
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        let output = git_command(&self.git_dir).args(args).output()?;
        check_output(output, args)
    }

    fn run_stdout(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Streams `git rev-list` output one id at a time. A non-zero exit status is
/// reported as the last item.
struct RevList {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    command: String,
    done: bool,
}

impl RevList {
    fn finish(&mut self) -> Option<Result<String>> {
        self.done = true;
        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        match self.child.wait() {
            Ok(status) if status.success() => None,
            Ok(_) => Some(Err(EventcError::GitCommandFailed {
                command: self.command.clone(),
                stderr: stderr.trim().to_string(),
            })),
            Err(e) => Some(Err(e.into())),
        }
    }
}

impl Iterator for RevList {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.lines.next() {
            Some(Ok(line)) => Some(Ok(line.trim().to_string())),
            Some(Err(e)) => {
                self.done = true;
                let _ = self.child.kill();
                let _ = self.child.wait();
                Some(Err(e.into()))
            }
            None => self.finish(),
        }
    }
}

impl Drop for RevList {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn parse_name_status(output: &[u8]) -> Vec<String> {
    let mut fields = output
        .split(|b| *b == 0)
        .map(|field| String::from_utf8_lossy(field).into_owned());
    let mut paths = Vec::new();

    while let Some(status) = fields.next() {
        if status.is_empty() {
            continue;
        }
        let Some(path) = fields.next() else {
            break;
        };
        if status.starts_with('R') || status.starts_with('C') {
            match fields.next() {
                Some(new_path) => paths.push(rename_display(&path, &new_path)),
                None => paths.push(path),
            }
        } else {
            paths.push(path);
        }
    }
    paths
}

impl Repository for GitRepository {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_bare(&self) -> bool {
        self.bare
    }

    fn config_value(&self, key: &str) -> Option<String> {
        let output = git_command(&self.git_dir)
            .args(["config", "--get", key])
            .output();
        match output {
            Ok(output) if output.status.success() => {
                let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
                (!value.is_empty()).then_some(value)
            }
            // Exit status 1 means the key is unset
            Ok(output) if output.status.code() == Some(1) => None,
            Ok(output) => {
                warn!(
                    "git config --get {} failed: {}",
                    key,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                None
            }
            Err(e) => {
                warn!("Couldn't run git config: {}", e);
                None
            }
        }
    }

    fn resolve_commit(&self, rev: &str) -> Result<String> {
        let rev_arg = format!("{}^{{commit}}", rev);
        let output = git_command(&self.git_dir)
            .args(["rev-parse", "--verify", "--quiet", &rev_arg])
            .output()?;
        if !output.status.success() {
            return Err(EventcError::ObjectNotFound(rev.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn rev_walk(&self, range: &CommitRange, order: WalkOrder) -> Result<CommitIds<'_>> {
        let mut args = vec!["rev-list".to_string(), "--topo-order".to_string()];
        if order == WalkOrder::Reverse {
            args.push("--reverse".to_string());
        }
        args.push(range.new.clone());
        if let Some(exclude) = &range.exclude {
            args.push(format!("^{}", exclude));
        }
        args.push("--".to_string());

        let command = format!("git {}", args.join(" "));
        debug!("Running {}", command);
        let mut child = git_command(&self.git_dir)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| EventcError::GitCommandFailed {
            command: command.clone(),
            stderr: "no stdout".to_string(),
        })?;

        Ok(Box::new(RevList {
            child,
            lines: BufReader::new(stdout).lines(),
            command,
            done: false,
        }))
    }

    fn commit(&self, id: &str) -> Result<Commit> {
        let rev_arg = format!("{}^{{commit}}", id);
        let args = [
            "show",
            "-s",
            "--no-show-signature",
            "--format=%H%x00%P%x00%an%x00%ae%x00%B",
            rev_arg.as_str(),
        ];
        let output = git_command(&self.git_dir).args(args).output()?;
        if !output.status.success() {
            return Err(EventcError::ObjectNotFound(id.to_string()));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut fields = stdout.splitn(5, '\0');

        let mut next = |name: &str| {
            fields
                .next()
                .map(str::to_string)
                .ok_or_else(|| EventcError::MalformedInput(format!("commit {} has no {}", id, name)))
        };
        let full_id = next("id")?.trim().to_string();
        let parents = next("parents")?
            .split_whitespace()
            .map(String::from)
            .collect();
        let name = next("author name")?;
        let email = next("author email")?;
        let message = next("message")?;

        Ok(Commit {
            id: full_id,
            parents,
            author: Author {
                name,
                email: (!email.is_empty()).then_some(email),
                username: None,
            },
            message: message.trim_end().to_string(),
            changed_paths: Vec::new(),
        })
    }

    fn changed_paths(&self, commit: &Commit, options: &DiffOptions) -> Result<Vec<String>> {
        let Some(parent) = commit.parents.first() else {
            let output = self.run(&["ls-tree", "-r", "--name-only", "-z", &commit.id])?;
            return Ok(output
                .stdout
                .split(|b| *b == 0)
                .filter(|path| !path.is_empty())
                .map(|path| String::from_utf8_lossy(path).into_owned())
                .collect());
        };

        let mut args = vec![
            "diff-tree".to_string(),
            "-r".to_string(),
            "--no-commit-id".to_string(),
            "--name-status".to_string(),
            "-z".to_string(),
        ];
        if let Some(threshold) = options.rename_threshold {
            args.push(format!("-M{}%", threshold));
        }
        if let Some(threshold) = options.copy_threshold {
            args.push(format!("-C{}%", threshold));
        }
        args.push(parent.clone());
        args.push(commit.id.clone());

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run(&args)?;
        Ok(parse_name_status(&output.stdout))
    }

    fn tag_targets(&self) -> Result<HashMap<String, Vec<String>>> {
        let stdout = self.run_stdout(&[
            "for-each-ref",
            "--format=%(refname:strip=2)%00%(objectname)%00%(*objectname)",
            "refs/tags",
        ])?;

        let mut targets: HashMap<String, Vec<String>> = HashMap::new();
        for line in stdout.lines() {
            let mut fields = line.split('\0');
            let (Some(name), Some(object), peeled) = (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            let commit = peeled.filter(|p| !p.is_empty()).unwrap_or(object);
            targets
                .entry(commit.to_string())
                .or_default()
                .push(name.to_string());
        }
        Ok(targets)
    }
}
