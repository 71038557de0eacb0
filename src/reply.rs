use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::teamcity::{BuildRecord, BuildState, BuildStatus};

/// HipChat notification colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Green,
    Yellow,
    Red,
}

impl Color {
    /// Green for a successful finished build, red for a failed one,
    /// yellow while anything is still undecided.
    pub fn for_build(state: BuildState, status: BuildStatus) -> Self {
        match (state, status) {
            (BuildState::Finished, BuildStatus::Success) => Self::Green,
            (BuildState::Finished, BuildStatus::Failure) => Self::Red,
            _ => Self::Yellow,
        }
    }

    /// A completed build is either good or it isn't.
    pub fn for_completion(status: BuildStatus) -> Self {
        if status == BuildStatus::Success {
            Self::Green
        } else {
            Self::Red
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    #[default]
    Html,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    Help { prefix: String },
    BuildList(Vec<String>),
    ListFailed,
    Kicked {
        config_id: String,
        branch: String,
        task_id: String,
    },
    KickFailed { config_id: String, reason: String },
    Status(BuildRecord),
    StatusFailed { task_id: String, reason: String },
    Version { build_type: String, version: String },
    VersionFailed { build_type: String, reason: String },
    Completed(BuildRecord),
}

/// A typed chat reply. Rendering to HTML or text happens at send time.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub color: Color,
    pub body: ReplyBody,
}

impl Reply {
    pub fn new(color: Color, body: ReplyBody) -> Self {
        Self { color, body }
    }

    pub fn help(prefix: &str, color: Color) -> Self {
        Self::new(
            color,
            ReplyBody::Help {
                prefix: prefix.to_string(),
            },
        )
    }

    pub fn status(record: BuildRecord) -> Self {
        Self::new(
            Color::for_build(record.state, record.status),
            ReplyBody::Status(record),
        )
    }

    pub fn completed(record: BuildRecord) -> Self {
        Self::new(
            Color::for_completion(record.status),
            ReplyBody::Completed(record),
        )
    }

    pub fn render(&self, format: MessageFormat) -> String {
        match format {
            MessageFormat::Html => self.render_html(),
            MessageFormat::Text => self.render_text(),
        }
    }

    fn render_html(&self) -> String {
        match &self.body {
            ReplyBody::Help { prefix } => {
                let prefix = escape_html(prefix);
                format!(
                    "<b>TeamCity build bot</b><br/>Usage:<ul>\
                     <li><code>{prefix} list</code> - list RC and CI build configurations</li>\
                     <li><code>{prefix} kick &lt;buildConfigId&gt; &lt;branch&gt;</code> - queue a build</li>\
                     <li><code>{prefix} status &lt;taskId&gt;</code> - show the state of a queued build</li>\
                     <li><code>{prefix} version &lt;buildConfigId&gt;</code> - artifact version of the last successful build</li>\
                     <li><code>{prefix} --help</code> - show this message</li></ul>"
                )
            }
            ReplyBody::BuildList(ids) if ids.is_empty() => {
                "<b>No RC or CI build configurations found</b>".to_string()
            }
            ReplyBody::BuildList(ids) => {
                let mut out = String::from("<b>Build configurations</b><ol>");
                for id in ids {
                    let _ = write!(out, "<li>{}</li>", escape_html(id));
                }
                out.push_str("</ol>");
                out
            }
            ReplyBody::ListFailed => "<b>Error getting build list</b>".to_string(),
            ReplyBody::Kicked {
                config_id,
                branch,
                task_id,
            } => format!(
                "Build <b>{}</b> on branch <b>{}</b> queued as task <b>{}</b>",
                escape_html(config_id),
                escape_html(branch),
                escape_html(task_id)
            ),
            ReplyBody::KickFailed { config_id, reason } => format!(
                "<b>Error kicking off build {}</b>: {}",
                escape_html(config_id),
                escape_html(reason)
            ),
            ReplyBody::Status(record) => {
                let mut out = format!(
                    "Build <b>{}</b> #{}: state <b>{}</b>, status <b>{}</b>",
                    escape_html(&record.build_type_id),
                    record.id,
                    record.state,
                    record.status
                );
                if let Some(text) = &record.status_text {
                    let _ = write!(out, " ({})", escape_html(text));
                }
                if let Some(url) = &record.web_url {
                    let _ = write!(out, " <a href=\"{}\">details</a>", escape_html(url));
                }
                out
            }
            ReplyBody::StatusFailed { task_id, reason } => format!(
                "<b>Error getting status for task {}</b>: {}",
                escape_html(task_id),
                escape_html(reason)
            ),
            ReplyBody::Version {
                build_type,
                version,
            } => format!(
                "Latest successful <b>{}</b> artifact is version <b>{}</b>",
                escape_html(build_type),
                escape_html(version)
            ),
            ReplyBody::VersionFailed { build_type, reason } => format!(
                "<b>Error getting artifact version for {}</b>: {}",
                escape_html(build_type),
                escape_html(reason)
            ),
            ReplyBody::Completed(record) => format!(
                "Build complete for <b>{}</b> #{}: state <b>{}</b>, status <b>{}</b>",
                escape_html(&record.build_type_id),
                record.id,
                record.state,
                record.status
            ),
        }
    }

    fn render_text(&self) -> String {
        match &self.body {
            ReplyBody::Help { prefix } => format!(
                "TeamCity build bot usage:\n\
                 {prefix} list - list RC and CI build configurations\n\
                 {prefix} kick <buildConfigId> <branch> - queue a build\n\
                 {prefix} status <taskId> - show the state of a queued build\n\
                 {prefix} version <buildConfigId> - artifact version of the last successful build\n\
                 {prefix} --help - show this message"
            ),
            ReplyBody::BuildList(ids) if ids.is_empty() => {
                "No RC or CI build configurations found".to_string()
            }
            ReplyBody::BuildList(ids) => ids
                .iter()
                .enumerate()
                .map(|(i, id)| format!("{}. {id}", i + 1))
                .collect::<Vec<_>>()
                .join("\n"),
            ReplyBody::ListFailed => "Error getting build list".to_string(),
            ReplyBody::Kicked {
                config_id,
                branch,
                task_id,
            } => format!("Build {config_id} on branch {branch} queued as task {task_id}"),
            ReplyBody::KickFailed { config_id, reason } => {
                format!("Error kicking off build {config_id}: {reason}")
            }
            ReplyBody::Status(record) => {
                let mut out = format!(
                    "Build {} #{}: state {}, status {}",
                    record.build_type_id, record.id, record.state, record.status
                );
                if let Some(text) = &record.status_text {
                    let _ = write!(out, " ({text})");
                }
                if let Some(url) = &record.web_url {
                    let _ = write!(out, " {url}");
                }
                out
            }
            ReplyBody::StatusFailed { task_id, reason } => {
                format!("Error getting status for task {task_id}: {reason}")
            }
            ReplyBody::Version {
                build_type,
                version,
            } => format!("Latest successful {build_type} artifact is version {version}"),
            ReplyBody::VersionFailed { build_type, reason } => {
                format!("Error getting artifact version for {build_type}: {reason}")
            }
            ReplyBody::Completed(record) => format!(
                "Build complete for {} #{}: state {}, status {}",
                record.build_type_id, record.id, record.state, record.status
            ),
        }
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(state: BuildState, status: BuildStatus) -> BuildRecord {
        BuildRecord {
            id: 21766,
            href: "/httpAuth/app/rest/buildQueue/id:21766".to_string(),
            build_type_id: "Web_CI".to_string(),
            state,
            status,
            status_text: None,
            branch_name: None,
            number: None,
            web_url: None,
        }
    }

    #[test]
    fn test_status_color_mapping() {
        assert_eq!(
            Color::for_build(BuildState::Finished, BuildStatus::Success),
            Color::Green
        );
        assert_eq!(
            Color::for_build(BuildState::Finished, BuildStatus::Failure),
            Color::Red
        );
        assert_eq!(
            Color::for_build(BuildState::Running, BuildStatus::Success),
            Color::Yellow
        );
        assert_eq!(
            Color::for_build(BuildState::Running, BuildStatus::Failure),
            Color::Yellow
        );
        assert_eq!(
            Color::for_build(BuildState::Finished, BuildStatus::Unknown),
            Color::Yellow
        );
    }

    #[test]
    fn test_completion_color() {
        assert_eq!(Color::for_completion(BuildStatus::Success), Color::Green);
        assert_eq!(Color::for_completion(BuildStatus::Failure), Color::Red);
        assert_eq!(Color::for_completion(BuildStatus::Unknown), Color::Red);
    }

    #[test]
    fn test_build_list_rendering() {
        let reply = Reply::new(
            Color::Green,
            ReplyBody::BuildList(vec!["A_CI".to_string(), "C_RC".to_string()]),
        );
        assert_eq!(
            reply.render(MessageFormat::Html),
            "<b>Build configurations</b><ol><li>A_CI</li><li>C_RC</li></ol>"
        );
        assert_eq!(reply.render(MessageFormat::Text), "1. A_CI\n2. C_RC");
    }

    #[test]
    fn test_html_escapes_server_strings() {
        let mut rec = record(BuildState::Finished, BuildStatus::Failure);
        rec.status_text = Some("<script>alert(1)</script>".to_string());
        let html = Reply::status(rec).render(MessageFormat::Html);
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_help_mentions_prefix() {
        let reply = Reply::help("/tc", Color::Yellow);
        assert!(reply.render(MessageFormat::Text).contains("/tc kick"));
        assert!(reply.render(MessageFormat::Html).contains("<code>/tc status"));
    }

    #[test]
    fn test_completed_reply() {
        let reply = Reply::completed(record(BuildState::Finished, BuildStatus::Success));
        assert_eq!(reply.color, Color::Green);
        assert_eq!(
            reply.render(MessageFormat::Text),
            "Build complete for Web_CI #21766: state finished, status SUCCESS"
        );
    }

    #[test]
    fn test_color_and_format_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Color::Yellow).unwrap(), "\"yellow\"");
        assert_eq!(
            serde_json::to_string(&MessageFormat::Html).unwrap(),
            "\"html\""
        );
    }
}
