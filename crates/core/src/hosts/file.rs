//! Hosts file backed store

use super::{HostsStore, validate_hostname};
use crate::error::{HostsError, HostsResult};
use async_trait::async_trait;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::debug;

/// Location of the system hosts file
#[cfg(windows)]
pub const SYSTEM_HOSTS_PATH: &str = r"C:\Windows\System32\drivers\etc\hosts";

/// Location of the system hosts file
#[cfg(not(windows))]
pub const SYSTEM_HOSTS_PATH: &str = "/etc/hosts";

/// Line ending used for new lines when the file has none to copy
#[cfg(windows)]
const DEFAULT_NEWLINE: &str = "\r\n";

/// Line ending used for new lines when the file has none to copy
#[cfg(not(windows))]
const DEFAULT_NEWLINE: &str = "\n";

/// One line of a hosts file, including its terminator
#[derive(Debug, Clone)]
enum Line {
    /// Address line; `raw` is kept until the line is changed
    Entry {
        address: IpAddr,
        names: Vec<String>,
        comment: Option<String>,
        raw: Option<String>,
        ending: String,
    },
    /// Comment, blank or unparseable line, written back verbatim
    Other(String),
}

impl Line {
    fn parse(raw: &str) -> Self {
        let text = raw.trim_end_matches(['\r', '\n']);
        let ending = &raw[text.len()..];
        let (body, comment) = match text.split_once('#') {
            Some((body, comment)) => (body, Some(comment.trim().to_string())),
            None => (text, None),
        };
        let mut tokens = body.split_whitespace();
        let address = tokens.next().and_then(|token| token.parse::<IpAddr>().ok());
        let names: Vec<String> = tokens.map(str::to_string).collect();

        match address {
            Some(address) if !names.is_empty() => Line::Entry {
                address,
                names,
                comment,
                raw: Some(raw.to_string()),
                ending: ending.to_string(),
            },
            _ => Line::Other(raw.to_string()),
        }
    }

    fn render(&self) -> String {
        match self {
            Line::Entry { raw: Some(raw), .. } | Line::Other(raw) => raw.clone(),
            Line::Entry {
                address,
                names,
                comment,
                raw: None,
                ending,
            } => {
                let mut line = format!("{address} {}", names.join(" "));
                if let Some(comment) = comment {
                    line.push_str(" # ");
                    line.push_str(comment);
                }
                line.push_str(ending);
                line
            }
        }
    }
}

/// In-memory copy of a hosts file that can be edited and written back.
///
/// Lines keep their own terminators, so a file whose changes are undone
/// renders back to the exact bytes it was parsed from.
#[derive(Debug, Clone)]
pub struct HostsFile {
    path: PathBuf,
    lines: Vec<Line>,
    newline: &'static str,
}

impl HostsFile {
    /// Read and parse the hosts file at `path`
    pub async fn load(path: impl Into<PathBuf>) -> HostsResult<Self> {
        let path = path.into();
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| HostsError::Open {
                path: path.clone(),
                source,
            })?;
        debug!("Loaded hosts file {}", path.display());
        Ok(Self::parse(path, &contents))
    }

    /// Parse hosts file contents that will be saved to `path`
    pub fn parse(path: impl Into<PathBuf>, contents: &str) -> Self {
        let newline = match contents.find('\n') {
            Some(end) if contents[..end].ends_with('\r') => "\r\n",
            Some(_) => "\n",
            None => DEFAULT_NEWLINE,
        };
        Self {
            path: path.into(),
            lines: contents.split_inclusive('\n').map(Line::parse).collect(),
            newline,
        }
    }

    /// Addresses `name` currently resolves to, in file order
    fn addresses_for(&self, name: &str) -> Vec<IpAddr> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Entry { address, names, .. }
                    if names.iter().any(|n| n.eq_ignore_ascii_case(name)) =>
                {
                    Some(*address)
                }
                _ => None,
            })
            .collect()
    }

    /// Render the file as it will be written by [`HostsStore::save`]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            // An unterminated last line gets a terminator once lines follow it
            if !out.is_empty() && !out.ends_with('\n') {
                out.push_str(self.newline);
            }
            out.push_str(&line.render());
        }
        out
    }

    /// Remove `name` from every entry whose address is not `keep`.
    /// Entries left without names are dropped.
    fn drop_name(&mut self, name: &str, keep: Option<IpAddr>) {
        self.lines.retain_mut(|line| {
            let Line::Entry {
                address,
                names,
                raw,
                ..
            } = line
            else {
                return true;
            };
            if Some(*address) == keep {
                return true;
            }
            let before = names.len();
            names.retain(|n| !n.eq_ignore_ascii_case(name));
            if names.len() != before {
                *raw = None;
            }
            !names.is_empty()
        });
    }
}

#[async_trait]
impl HostsStore for HostsFile {
    async fn add_hosts(&mut self, address: IpAddr, names: &[String]) -> HostsResult<()> {
        for name in names {
            validate_hostname(name)?;
        }
        for name in names {
            self.drop_name(name, Some(address));
            if !self.addresses_for(name).contains(&address) {
                self.lines.push(Line::Entry {
                    address,
                    names: vec![name.to_ascii_lowercase()],
                    comment: None,
                    raw: None,
                    ending: self.newline.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn remove_hosts(&mut self, names: &[String]) -> HostsResult<()> {
        for name in names {
            self.drop_name(name, None);
        }
        Ok(())
    }

    async fn save(&mut self) -> HostsResult<()> {
        tokio::fs::write(&self.path, self.render())
            .await
            .map_err(|source| HostsError::Persist {
                path: self.path.clone(),
                source,
            })?;
        debug!("Saved hosts file {}", self.path.display());
        Ok(())
    }
}
