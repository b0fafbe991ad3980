use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::PathsConfig;
use crate::error::ExecError;
use crate::task::Task;

lazy_static! {
    static ref INTERPRETER_BASE_RE: Regex =
        Regex::new(r".*[/\\!](.*)").expect("interpreter regex is valid");
}

/// Absolute paths must exist as given; relative paths are looked up under the
/// config dir, then the install dir.
pub async fn resolve_task_path(task: &Task, paths: &PathsConfig) -> Result<PathBuf, ExecError> {
    let rel = task.base.path.as_str();
    if rel.is_empty() {
        return Err(ExecError::EmptyPath(task.name().to_string()));
    }
    let given = Path::new(rel);
    if given.is_absolute() {
        return match tokio::fs::metadata(given).await {
            Ok(_) => {
                tracing::debug!(path = %given.display(), "using fully specified path to task");
                Ok(given.to_path_buf())
            }
            Err(source) => Err(ExecError::InvalidPath {
                path: given.to_path_buf(),
                source,
            }),
        };
    }

    let config_dir = paths
        .config_dir
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());
    for base in config_dir.into_iter().chain([paths.install_dir.as_str()]) {
        let candidate = Path::new(base).join(given);
        if tokio::fs::metadata(&candidate).await.is_ok() {
            tracing::debug!(path = %candidate.display(), "resolved external task");
            return Ok(candidate);
        }
    }
    Err(ExecError::NotFound(task.name().to_string()))
}

/// The interpreter named on a "#!" first line.
pub async fn read_interpreter(script: &Path) -> Result<String, ExecError> {
    let fail = |reason: String| ExecError::Interpreter {
        path: script.to_path_buf(),
        reason,
    };
    let file = tokio::fs::File::open(script)
        .await
        .map_err(|e| fail(format!("opening file: {e}")))?;
    let mut first = String::new();
    let n = BufReader::new(file)
        .read_line(&mut first)
        .await
        .map_err(|e| fail(format!("reading first line: {e}")))?;
    if n == 0 || !first.ends_with('\n') {
        return Err(fail("reading first line: unexpected end of file".into()));
    }
    let Some(interpreter) = first.strip_prefix("#!") else {
        return Err(fail("first line doesn't start with '#!'".into()));
    };
    Ok(interpreter.trim_end_matches(['\n', '\r']).to_string())
}

/// Quotes arguments for interpreters that re-split their command line.
pub fn fix_interpreter_args(interpreter: &str, args: Vec<String>) -> Vec<String> {
    let base = INTERPRETER_BASE_RE
        .captures(interpreter)
        .and_then(|c| c.get(1))
        .map_or(interpreter, |m| m.as_str());
    match base.trim() {
        "powershell" | "powershell.exe" => args
            .into_iter()
            .map(|a| {
                if a.is_empty() {
                    "''".to_string()
                } else {
                    a.replace(' ', "` ").replace(',', "`,").replace(';', "`;")
                }
            })
            .collect(),
        _ => args,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{JobSpec, TaskBase, TaskKind};

    fn task(path: &str) -> Task {
        Task {
            base: TaskBase {
                name: "hello".into(),
                path: path.into(),
                ..TaskBase::default()
            },
            kind: TaskKind::Job(JobSpec::default()),
        }
    }

    #[tokio::test]
    async fn config_dir_is_searched_before_install_dir() {
        let install = tempfile::tempdir().unwrap();
        let config = tempfile::tempdir().unwrap();
        std::fs::write(install.path().join("hello.sh"), "#!/bin/sh\n").unwrap();
        let paths = PathsConfig {
            install_dir: install.path().display().to_string(),
            config_dir: Some(config.path().display().to_string()),
            history_dir: None,
        };

        let found = resolve_task_path(&task("hello.sh"), &paths).await.unwrap();
        assert_eq!(found, install.path().join("hello.sh"));

        std::fs::write(config.path().join("hello.sh"), "#!/bin/sh\n").unwrap();
        let found = resolve_task_path(&task("hello.sh"), &paths).await.unwrap();
        assert_eq!(found, config.path().join("hello.sh"));

        assert!(matches!(
            resolve_task_path(&task("missing.sh"), &paths).await,
            Err(ExecError::NotFound(_))
        ));
        assert!(matches!(
            resolve_task_path(&task("/definitely/not/here.sh"), &paths).await,
            Err(ExecError::InvalidPath { .. })
        ));
    }

    #[tokio::test]
    async fn interpreter_requires_shebang() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.sh");
        let bad = dir.path().join("bad.sh");
        std::fs::write(&good, "#!/bin/bash\r\necho hi\n").unwrap();
        std::fs::write(&bad, "echo hi\n").unwrap();

        assert_eq!(read_interpreter(&good).await.unwrap(), "/bin/bash");
        assert!(matches!(
            read_interpreter(&bad).await,
            Err(ExecError::Interpreter { .. })
        ));
    }

    #[test]
    fn powershell_arguments_are_escaped() {
        let args = vec!["run".to_string(), "a b,c;d".to_string(), String::new()];
        assert_eq!(
            fix_interpreter_args("C:\\Windows\\powershell.exe", args.clone()),
            vec!["run", "a` b`,c`;d", "''"]
        );
        assert_eq!(fix_interpreter_args("/bin/sh", args.clone()), args);
    }
}
