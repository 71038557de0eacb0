use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::reply::{Color, Reply, ReplyBody};
use crate::teamcity::{BuildRequest, BuildSession, TeamCityClient};

/// A chat command after tokenising `<prefix> <action> [args...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Kick { config_id: String, branch: String },
    Status { task_id: String },
    Version { build_type: String },
    Help,
    /// Unknown action, wrong argument count or wrong prefix
    Usage,
}

impl Command {
    pub fn parse(text: &str, prefix: &str) -> Self {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let Some((&first, rest)) = tokens.split_first() else {
            return Self::Usage;
        };
        if first != prefix {
            return Self::Usage;
        }

        match rest {
            ["list"] => Self::List,
            ["kick", config_id, branch] => Self::Kick {
                config_id: (*config_id).to_string(),
                branch: (*branch).to_string(),
            },
            ["status", task_id] => Self::Status {
                task_id: (*task_id).to_string(),
            },
            ["version", build_type] => Self::Version {
                build_type: (*build_type).to_string(),
            },
            ["--help"] => Self::Help,
            _ => Self::Usage,
        }
    }
}

/// Reply for the room, plus the session of a freshly kicked build so the
/// caller can watch it.
pub struct Dispatch {
    pub reply: Reply,
    pub session: Option<BuildSession>,
}

impl Dispatch {
    fn reply(reply: Reply) -> Self {
        Self {
            reply,
            session: None,
        }
    }
}

pub struct Dispatcher {
    client: Arc<TeamCityClient>,
    prefix: String,
}

impl Dispatcher {
    pub fn new(client: Arc<TeamCityClient>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    /// Runs one chat command. Failures become red or yellow replies; this
    /// never returns an error.
    pub async fn dispatch(&self, text: &str) -> Dispatch {
        let command = Command::parse(text, &self.prefix);
        info!("Dispatching {command:?}");

        match command {
            Command::List => Dispatch::reply(self.list().await),
            Command::Kick { config_id, branch } => self.kick(config_id, branch).await,
            Command::Status { task_id } => Dispatch::reply(self.status(task_id).await),
            Command::Version { build_type } => Dispatch::reply(self.version(build_type).await),
            Command::Help => Dispatch::reply(Reply::help(&self.prefix, Color::Green)),
            Command::Usage => Dispatch::reply(Reply::help(&self.prefix, Color::Yellow)),
        }
    }

    async fn list(&self) -> Reply {
        match self.client.list_build_types().await {
            Ok(build_types) => {
                let mut ids: Vec<String> = build_types
                    .into_iter()
                    .filter(|bt| {
                        let keep = bt.id.ends_with("_RC") || bt.id.ends_with("_CI");
                        if !keep {
                            debug!("Skipping {} ({})", bt.id, bt.name);
                        }
                        keep
                    })
                    .map(|bt| bt.id)
                    .collect();
                ids.sort();
                Reply::new(Color::Green, ReplyBody::BuildList(ids))
            }
            Err(e) => {
                warn!("Failed to list build types: {e}");
                Reply::new(Color::Red, ReplyBody::ListFailed)
            }
        }
    }

    async fn kick(&self, config_id: String, branch: String) -> Dispatch {
        let mut session = BuildSession::new(Arc::clone(&self.client));
        let mut params = BTreeMap::new();
        params.insert("Branch".to_string(), branch.clone());

        let queued = match session.set_build_request(BuildRequest::new(&config_id, &branch)) {
            Ok(()) => session.build(&params).await.map(|record| {
                record
                    .task_id()
                    .map_or_else(|| record.id.to_string(), ToString::to_string)
            }),
            Err(e) => Err(e),
        };

        match queued {
            Ok(task_id) => Dispatch {
                reply: Reply::new(
                    Color::Green,
                    ReplyBody::Kicked {
                        config_id,
                        branch,
                        task_id,
                    },
                ),
                session: Some(session),
            },
            Err(e) => {
                warn!("Failed to kick {config_id} on {branch}: {e}");
                Dispatch::reply(Reply::new(
                    Color::Red,
                    ReplyBody::KickFailed {
                        config_id,
                        reason: e.to_string(),
                    },
                ))
            }
        }
    }

    async fn status(&self, task_id: String) -> Reply {
        match self.client.get_build_by_task_id(&task_id).await {
            Ok(record) => Reply::status(record),
            Err(e) => {
                warn!("Failed to get status of task {task_id}: {e}");
                Reply::new(
                    Color::Red,
                    ReplyBody::StatusFailed {
                        task_id,
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    async fn version(&self, build_type: String) -> Reply {
        match self.client.latest_artifact_version(&build_type).await {
            Ok(version) => Reply::new(
                Color::Green,
                ReplyBody::Version {
                    build_type,
                    version,
                },
            ),
            Err(e) => {
                warn!("Failed to get artifact version of {build_type}: {e}");
                Reply::new(
                    Color::Red,
                    ReplyBody::VersionFailed {
                        build_type,
                        reason: e.to_string(),
                    },
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teamcity::{test_client, SessionState};
    use mockito::{Matcher, Server};

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/build list", "/build"), Command::List);
        assert_eq!(
            Command::parse("/build  kick Web_CI   develop", "/build"),
            Command::Kick {
                config_id: "Web_CI".to_string(),
                branch: "develop".to_string()
            }
        );
        assert_eq!(
            Command::parse("/build status 21766\n", "/build"),
            Command::Status {
                task_id: "21766".to_string()
            }
        );
        assert_eq!(
            Command::parse("/build version Web_RC", "/build"),
            Command::Version {
                build_type: "Web_RC".to_string()
            }
        );
        assert_eq!(Command::parse("/build --help", "/build"), Command::Help);
    }

    #[test]
    fn test_parse_usage_cases() {
        assert_eq!(Command::parse("", "/build"), Command::Usage);
        assert_eq!(Command::parse("/build", "/build"), Command::Usage);
        assert_eq!(Command::parse("/build kick Web_CI", "/build"), Command::Usage);
        assert_eq!(
            Command::parse("/build kick Web_CI main extra", "/build"),
            Command::Usage
        );
        assert_eq!(Command::parse("/build status", "/build"), Command::Usage);
        assert_eq!(Command::parse("/build list all", "/build"), Command::Usage);
        assert_eq!(Command::parse("/build deploy x", "/build"), Command::Usage);
        assert_eq!(Command::parse("/deploy list", "/build"), Command::Usage);
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/httpAuth/app/rest/buildTypes")
            .with_status(200)
            .with_body(
                r#"{"buildType": [
                    {"id": "C_RC", "name": "C"},
                    {"id": "B", "name": "B"},
                    {"id": "A_CI", "name": "A"}
                ]}"#,
            )
            .create_async()
            .await;

        let dispatcher = Dispatcher::new(test_client(&server.url()), "/build");
        let dispatch = dispatcher.dispatch("/build list").await;
        assert_eq!(dispatch.reply.color, Color::Green);
        assert_eq!(
            dispatch.reply.body,
            ReplyBody::BuildList(vec!["A_CI".to_string(), "C_RC".to_string()])
        );
        assert!(dispatch.session.is_none());
    }

    #[tokio::test]
    async fn test_list_failure_is_red() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/httpAuth/app/rest/buildTypes")
            .with_status(401)
            .create_async()
            .await;

        let dispatcher = Dispatcher::new(test_client(&server.url()), "/build");
        let dispatch = dispatcher.dispatch("/build list").await;
        assert_eq!(dispatch.reply.color, Color::Red);
        assert_eq!(dispatch.reply.body, ReplyBody::ListFailed);
    }

    #[tokio::test]
    async fn test_kick_queues_build_and_returns_session() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/httpAuth/app/rest/buildQueue")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "buildType": {"id": "Web_CI"},
                "branchName": "develop",
                "properties": {"property": [{"name": "Branch", "value": "develop"}]}
            })))
            .with_status(200)
            .with_body(
                r#"{"id": 300, "buildTypeId": "Web_CI", "state": "queued",
                    "href": "/httpAuth/app/rest/buildQueue/id:300"}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let dispatcher = Dispatcher::new(test_client(&server.url()), "/build");
        let dispatch = dispatcher.dispatch("/build kick Web_CI develop").await;

        assert_eq!(dispatch.reply.color, Color::Green);
        assert_eq!(
            dispatch.reply.body,
            ReplyBody::Kicked {
                config_id: "Web_CI".to_string(),
                branch: "develop".to_string(),
                task_id: "300".to_string()
            }
        );
        let session = dispatch.session.unwrap();
        assert_eq!(session.state(), SessionState::Queued);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_kick_failure_is_red_without_session() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/httpAuth/app/rest/buildQueue")
            .with_status(500)
            .create_async()
            .await;

        let dispatcher = Dispatcher::new(test_client(&server.url()), "/build");
        let dispatch = dispatcher.dispatch("/build kick Web_CI develop").await;
        assert_eq!(dispatch.reply.color, Color::Red);
        assert!(matches!(dispatch.reply.body, ReplyBody::KickFailed { .. }));
        assert!(dispatch.session.is_none());
    }

    #[tokio::test]
    async fn test_kick_with_missing_branch_is_yellow_help() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let dispatcher = Dispatcher::new(test_client(&server.url()), "/build");
        let dispatch = dispatcher.dispatch("/build kick Web_CI").await;
        assert_eq!(dispatch.reply, Reply::help("/build", Color::Yellow));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_colors() {
        let mut server = Server::new_async().await;
        for (task, state, status) in [
            ("1", "finished", "SUCCESS"),
            ("2", "finished", "FAILURE"),
            ("3", "running", "SUCCESS"),
        ] {
            server
                .mock("GET", format!("/httpAuth/app/rest/buildQueue/taskId:{task}").as_str())
                .with_status(200)
                .with_body(format!(
                    r#"{{"id": {task}, "buildTypeId": "Web_CI", "state": "{state}", "status": "{status}"}}"#
                ))
                .create_async()
                .await;
        }

        let dispatcher = Dispatcher::new(test_client(&server.url()), "/build");
        assert_eq!(
            dispatcher.dispatch("/build status 1").await.reply.color,
            Color::Green
        );
        assert_eq!(
            dispatcher.dispatch("/build status 2").await.reply.color,
            Color::Red
        );
        assert_eq!(
            dispatcher.dispatch("/build status 3").await.reply.color,
            Color::Yellow
        );
    }

    #[tokio::test]
    async fn test_status_lookup_failure_is_red() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/httpAuth/app/rest/buildQueue/taskId:9")
            .with_status(404)
            .create_async()
            .await;

        let dispatcher = Dispatcher::new(test_client(&server.url()), "/build");
        let reply = dispatcher.dispatch("/build status 9").await.reply;
        assert_eq!(reply.color, Color::Red);
        assert!(matches!(reply.body, ReplyBody::StatusFailed { .. }));
    }

    #[tokio::test]
    async fn test_version_not_found_is_red() {
        let mut server = Server::new_async().await;
        server
            .mock(
                "GET",
                "/httpAuth/app/rest/buildTypes/id:Web_RC/builds/running:false,status:success",
            )
            .with_status(200)
            .with_body(r#"{"id": 900, "state": "finished", "status": "SUCCESS"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/httpAuth/app/rest/builds/id:900/artifacts/children")
            .with_status(200)
            .with_body(r#"{"file": []}"#)
            .create_async()
            .await;

        let dispatcher = Dispatcher::new(test_client(&server.url()), "/build");
        let reply = dispatcher.dispatch("/build version Web_RC").await.reply;
        assert_eq!(reply.color, Color::Red);
        assert!(matches!(reply.body, ReplyBody::VersionFailed { .. }));
    }

    #[tokio::test]
    async fn test_help_is_green() {
        let dispatcher = Dispatcher::new(test_client("http://127.0.0.1:9"), "/build");
        let reply = dispatcher.dispatch("/build --help").await.reply;
        assert_eq!(reply, Reply::help("/build", Color::Green));
    }
}
