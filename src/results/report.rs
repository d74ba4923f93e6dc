//! Text, markdown, and commit renderings of [`Results`], plus the explicit
//! step that writes modified sources to disk.

use super::{PackageResults, Results};
use crate::error::{EngineError, EngineResult};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use tracing::info;
use url::Url;

const GITHUB_BASE: &str = "https://github.com/";

impl fmt::Display for Results {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.packages.is_empty() {
            return writeln!(f, "No packages were {}.", self.operation.past_tense());
        }
        for (i, package) in self.packages.values().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write_package_summary(f, package)?;
        }
        Ok(())
    }
}

fn write_package_summary(f: &mut fmt::Formatter<'_>, package: &PackageResults) -> fmt::Result {
    writeln!(f, "Package: {}", package.package)?;

    if package.successes.is_empty() {
        writeln!(f, "  No successes")?;
    } else {
        writeln!(f, "  Successes:")?;
        for file in &package.successes {
            let names: Vec<&str> = file.tests.iter().map(|t| t.name.as_str()).collect();
            writeln!(f, "    {}: {}", file.file, names.join(", "))?;
        }
    }

    if package.failures.is_empty() {
        writeln!(f, "  No failures")?;
    } else {
        writeln!(f, "  Failures:")?;
        for name in &package.failures {
            writeln!(f, "    {}", name)?;
        }
    }
    Ok(())
}

impl Results {
    /// Pull-request ready report with permalinks into `owner/repo` at `branch`.
    pub fn markdown(&self, owner: &str, repo: &str, branch: &str) -> String {
        let op = self.operation;
        let mut out = format!("## {} tests\n", capitalize(op.past_tense()));

        if self.packages.is_empty() {
            out.push_str(&format!("\nNo tests were {}.\n", op.past_tense()));
            return out;
        }

        for package in self.packages.values() {
            out.push_str(&format!("\n### `{}`\n\n", package.package));

            if package.successes.is_empty() {
                out.push_str(&format!(
                    "_No tests were {} in this package._\n",
                    op.past_tense()
                ));
            } else {
                out.push_str("| File | Tests |\n| --- | --- |\n");
                for file in &package.successes {
                    let tests: Vec<String> = file
                        .tests
                        .iter()
                        .map(|t| {
                            let url = blob_url(owner, repo, branch, &file.file, Some(t.link_line(op)));
                            format!("[`{}`]({})", t.name, url)
                        })
                        .collect();
                    out.push_str(&format!(
                        "| [`{}`]({}) | {} |\n",
                        file.file,
                        blob_url(owner, repo, branch, &file.file, None),
                        tests.join(", ")
                    ));
                }
            }

            if !package.failures.is_empty() {
                out.push_str(&format!(
                    "\n**Failed to {} {} — needs manual intervention.**\n\n",
                    op.verb(),
                    count_tests(package.failures.len())
                ));
                for name in &package.failures {
                    out.push_str(&format!("- `{}`\n", name));
                }
            }
        }
        out
    }
}

/// Commit message plus relative path to new content for every edited file.
pub fn commit_changes(results: &Results) -> (String, BTreeMap<String, String>) {
    let op = results.operation;
    let total = results.success_count();
    let files: BTreeMap<String, String> = results
        .files()
        .map(|f| (f.file.clone(), f.modified_source_code.clone()))
        .collect();

    let mut message = format!("{} {}\n", capitalize(op.verb()), count_tests(total));
    let touched: Vec<&PackageResults> = results
        .packages
        .values()
        .filter(|p| !p.successes.is_empty())
        .collect();
    if !touched.is_empty() {
        message.push('\n');
        for package in touched {
            let names: Vec<&str> = package
                .succeeded_tests()
                .map(|t| t.name.as_str())
                .collect();
            message.push_str(&format!("- {}: {}\n", package.package, names.join(", ")));
        }
    }
    (message, files)
}

/// Write every modified file to its absolute path with 0600 permissions.
pub fn write_results_to_files(results: &Results) -> EngineResult<()> {
    for file in results.files() {
        let write_err = |source| EngineError::Write {
            path: file.file_abs.clone(),
            source,
        };

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut handle = options.open(&file.file_abs).map_err(write_err)?;
        handle
            .write_all(file.modified_source_code.as_bytes())
            .map_err(write_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&file.file_abs, fs::Permissions::from_mode(0o600))
                .map_err(write_err)?;
        }
        info!(file = %file.file, tests = file.tests.len(), "wrote modified source");
    }
    Ok(())
}

fn blob_url(owner: &str, repo: &str, branch: &str, file: &str, line: Option<usize>) -> String {
    let fallback = || {
        let mut url = format!("{}{}/{}/blob/{}/{}", GITHUB_BASE, owner, repo, branch, file);
        if let Some(line) = line {
            url.push_str(&format!("#L{}", line));
        }
        url
    };

    let Ok(mut url) = Url::parse(GITHUB_BASE) else {
        return fallback();
    };
    match url.path_segments_mut() {
        Ok(mut segments) => {
            segments
                .pop_if_empty()
                .push(owner)
                .push(repo)
                .push("blob")
                .extend(branch.split('/'))
                .extend(file.split('/'));
        }
        Err(()) => return fallback(),
    }
    if let Some(line) = line {
        url.set_fragment(Some(&format!("L{}", line)));
    }
    url.into()
}

fn count_tests(n: usize) -> String {
    if n == 1 {
        "1 test".to_string()
    } else {
        format!("{} tests", n)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
