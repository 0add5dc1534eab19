//! Status channel line parser
//!
//! Native committers report progress as colon-delimited lines on a dedicated
//! file descriptor. Two dialects are understood:
//!
//! - APT's `pmstatus:<pkg>:<percent>:<text>`, `pmerror:<pkg>:<percent>:<message>`
//!   and `pmconffile:<file>:<percent>:'<current>' '<new>' ...`
//! - dpkg's own `status: <pkg>: <state>` and `processing: <stage>: <pkg>`

use thiserror::Error;

/// One parsed status line
#[derive(Debug, Clone, PartialEq)]
pub enum StatusLine {
    Ok {
        package: String,
        percent: Option<f64>,
        description: String,
    },
    Error {
        package: String,
        message: String,
    },
    ConffilePrompt {
        current: String,
        new: String,
    },
}

/// A line that does not carry the three mandatory fields
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed status line: {line:?}")]
pub struct MalformedStatus {
    pub line: String,
}

impl From<MalformedStatus> for pkgd_errors::SupervisorError {
    fn from(err: MalformedStatus) -> Self {
        Self::MalformedStatus { line: err.line }
    }
}

/// Parse a single status-channel line.
///
/// # Errors
///
/// Returns `MalformedStatus` when the line has fewer than three
/// colon-separated fields.
pub fn parse_status_line(line: &str) -> Result<StatusLine, MalformedStatus> {
    let line = line.trim_end_matches(['\r', '\n']);
    let fields: Vec<&str> = line.splitn(4, ':').collect();
    if fields.len() < 3 {
        return Err(MalformedStatus {
            line: line.to_string(),
        });
    }

    let kind = fields[0].trim();
    let second = fields[1].trim();
    let rest = fields.get(3).map_or("", |s| s.trim());

    let parsed = match kind {
        "pmstatus" => StatusLine::Ok {
            package: second.to_string(),
            percent: fields[2].trim().parse().ok(),
            description: rest.to_string(),
        },
        "pmerror" => StatusLine::Error {
            package: second.to_string(),
            message: rest.to_string(),
        },
        "pmconffile" => conffile_prompt(second, rest),
        "status" => {
            let state = fields[2].trim();
            match state {
                "error" => StatusLine::Error {
                    package: second.to_string(),
                    message: rest.to_string(),
                },
                "conffile-prompt" => conffile_prompt(second, rest),
                _ => StatusLine::Ok {
                    package: second.to_string(),
                    percent: None,
                    description: join_tail(state, rest),
                },
            }
        }
        "processing" => StatusLine::Ok {
            package: join_tail(fields[2].trim(), rest),
            percent: None,
            description: second.to_string(),
        },
        _ => StatusLine::Ok {
            package: second.to_string(),
            percent: None,
            description: join_tail(fields[2].trim(), rest),
        },
    };
    Ok(parsed)
}

fn join_tail(head: &str, tail: &str) -> String {
    if tail.is_empty() {
        head.to_string()
    } else {
        format!("{head}:{tail}")
    }
}

/// `'<current>' '<new>' <useredited> <distedited>`
fn conffile_prompt(file: &str, payload: &str) -> StatusLine {
    let quoted: Vec<&str> = payload.split('\'').skip(1).step_by(2).collect();
    match quoted.as_slice() {
        [current, new, ..] => StatusLine::ConffilePrompt {
            current: (*current).to_string(),
            new: (*new).to_string(),
        },
        _ => StatusLine::ConffilePrompt {
            current: file.to_string(),
            new: format!("{file}.dpkg-new"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_apt_status() {
        assert_eq!(
            parse_status_line("pmstatus:foo:42.5:Installing foo").unwrap(),
            StatusLine::Ok {
                package: "foo".into(),
                percent: Some(42.5),
                description: "Installing foo".into(),
            }
        );
    }

    #[test]
    fn description_may_contain_colons() {
        let StatusLine::Ok { description, .. } =
            parse_status_line("pmstatus:foo:10:Preparing: foo 1:2.0").unwrap()
        else {
            panic!("expected ok line");
        };
        assert_eq!(description, "Preparing: foo 1:2.0");
    }

    #[test]
    fn parses_errors() {
        assert_eq!(
            parse_status_line("pmerror:bar:50:subprocess post-installation script returned error")
                .unwrap(),
            StatusLine::Error {
                package: "bar".into(),
                message: "subprocess post-installation script returned error".into(),
            }
        );
        assert_eq!(
            parse_status_line("status: bar: error: dependency problems").unwrap(),
            StatusLine::Error {
                package: "bar".into(),
                message: "dependency problems".into(),
            }
        );
    }

    #[test]
    fn parses_conffile_prompts() {
        assert_eq!(
            parse_status_line(
                "pmconffile:/etc/foo.conf:40:'/etc/foo.conf' '/etc/foo.conf.dpkg-new' 1 1"
            )
            .unwrap(),
            StatusLine::ConffilePrompt {
                current: "/etc/foo.conf".into(),
                new: "/etc/foo.conf.dpkg-new".into(),
            }
        );
        assert_eq!(
            parse_status_line("pmconffile:/etc/bar.conf:40:").unwrap(),
            StatusLine::ConffilePrompt {
                current: "/etc/bar.conf".into(),
                new: "/etc/bar.conf.dpkg-new".into(),
            }
        );
    }

    #[test]
    fn parses_dpkg_dialect() {
        assert_eq!(
            parse_status_line("status: foo: half-configured").unwrap(),
            StatusLine::Ok {
                package: "foo".into(),
                percent: None,
                description: "half-configured".into(),
            }
        );
        assert_eq!(
            parse_status_line("processing: configure: foo:amd64").unwrap(),
            StatusLine::Ok {
                package: "foo:amd64".into(),
                percent: None,
                description: "configure".into(),
            }
        );
    }

    #[test]
    fn short_lines_are_malformed() {
        assert!(parse_status_line("").is_err());
        assert!(parse_status_line("garbage").is_err());
        assert_eq!(
            parse_status_line("pmstatus:foo").unwrap_err(),
            MalformedStatus {
                line: "pmstatus:foo".into()
            }
        );
    }
}
