//! Inbound frame dispatch
//!
//! Classifies each frame a connection sends and routes it: registrations go
//! to the registry, screenshots and answers are role-checked and fanned out,
//! page HTML is fanned out to receivers as-is. A failed frame is dropped on
//! its own; the connection stays usable.

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use super::{BroadcastReport, ConnectionId, Relay};
use crate::server::{InboundFrame, ProtocolError, Role, ServerEvent};

/// Why a frame was dropped
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Malformed frame: {0}")]
    Protocol(#[from] ProtocolError),

    #[error(
        "{kind} received from non-{required} client (role: {})",
        .actual.as_ref().map_or("unregistered", Role::as_str)
    )]
    RoleMismatch {
        kind: &'static str,
        required: Role,
        actual: Option<Role>,
    },
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// What the dispatcher did with a frame
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// The sender's role was (re)set
    Registered(Role),
    /// The frame was fanned out
    Broadcast {
        kind: &'static str,
        report: BroadcastReport,
    },
    /// No handler for this frame type
    Ignored { kind: Option<String> },
}

impl Relay {
    /// Handle one inbound text frame from `from`
    pub async fn dispatch(&self, from: ConnectionId, text: &str) -> DispatchResult<Dispatched> {
        let frame = InboundFrame::from_json(text)?;
        self.dispatch_frame(from, frame).await
    }

    /// Handle an already classified frame from `from`
    pub async fn dispatch_frame(
        &self,
        from: ConnectionId,
        frame: InboundFrame,
    ) -> DispatchResult<Dispatched> {
        debug!("Dispatching {} frame from {}", frame.kind(), from);
        match frame {
            InboundFrame::Register { role } => {
                if self.registry().register(from, role.clone()).await {
                    info!("Client {} registered as {}", from, role);
                } else {
                    debug!("Registration from unknown connection {}", from);
                }
                Ok(Dispatched::Registered(role))
            }

            InboundFrame::Screenshot {
                question_id,
                screenshot,
            } => {
                self.require_role(from, Role::Helper, "screenshot").await?;
                let report = self.publish_screenshot(&question_id, &screenshot).await?;
                Ok(Dispatched::Broadcast {
                    kind: "new_screenshot",
                    report,
                })
            }

            InboundFrame::Answer {
                question_id,
                answer,
            } => {
                self.require_role(from, Role::Receiver, "answer").await?;
                info!("Received answer for questionId: {}", question_id);
                let event = ServerEvent::answer(question_id, answer, Utc::now());
                let report = self.router().broadcast_to_helpers(&event).await?;
                Ok(Dispatched::Broadcast {
                    kind: "answer",
                    report,
                })
            }

            // Page HTML is forwarded whatever the sender's role
            InboundFrame::PageHtml { html } => {
                let report = self.publish_page_html(&html).await?;
                Ok(Dispatched::Broadcast {
                    kind: "pageHTML",
                    report,
                })
            }

            InboundFrame::Unrecognized { kind } => {
                debug!("Ignoring frame of type {:?} from {}", kind, from);
                Ok(Dispatched::Ignored { kind })
            }
        }
    }

    async fn require_role(
        &self,
        from: ConnectionId,
        required: Role,
        kind: &'static str,
    ) -> DispatchResult<()> {
        let actual = self.registry().lookup(from).await.map(|r| r.role);
        if actual.as_ref() == Some(&required) {
            Ok(())
        } else {
            Err(DispatchError::RoleMismatch {
                kind,
                required,
                actual,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{ConnectionHandle, Outbound};
    use serde_json::{json, Value};

    async fn connect(relay: &Relay) -> (ConnectionId, Outbound) {
        let (handle, outbound) = ConnectionHandle::channel(16);
        let id = handle.id();
        relay.registry().connect(handle).await;
        (id, outbound)
    }

    async fn connect_as(relay: &Relay, role: &str) -> (ConnectionId, Outbound) {
        let (id, outbound) = connect(relay).await;
        let frame = json!({ "role": role }).to_string();
        relay.dispatch(id, &frame).await.unwrap();
        (id, outbound)
    }

    fn next_event(outbound: &mut Outbound) -> Option<Value> {
        outbound
            .frames
            .try_recv()
            .ok()
            .map(|frame| serde_json::from_str(&frame).unwrap())
    }

    #[tokio::test]
    async fn test_registration_frame() {
        let relay = Relay::new();
        let (id, _outbound) = connect(&relay).await;

        let result = relay.dispatch(id, r#"{"role": "helper"}"#).await.unwrap();
        assert_eq!(result, Dispatched::Registered(Role::Helper));
        assert_eq!(relay.registry().lookup(id).await.unwrap().role, Role::Helper);
    }

    #[tokio::test]
    async fn test_screenshot_from_helper_reaches_receivers() {
        let relay = Relay::new();
        let (helper, mut helper_out) = connect_as(&relay, "helper").await;
        let (_receiver, mut receiver_out) = connect_as(&relay, "receiver").await;

        let frame = r#"{"type": "screenshot", "questionId": "q1", "screenshot": "abc"}"#;
        let result = relay.dispatch(helper, frame).await.unwrap();
        assert!(matches!(
            result,
            Dispatched::Broadcast { kind: "new_screenshot", report } if report.delivered == 1
        ));

        let event = next_event(&mut receiver_out).unwrap();
        assert_eq!(event["type"], "new_screenshot");
        assert_eq!(event["questionId"], "q1");
        assert_eq!(event["screenshot"], "abc");
        assert!(event["timestamp"].as_str().unwrap().ends_with('Z'));
        assert!(next_event(&mut receiver_out).is_none());
        assert!(next_event(&mut helper_out).is_none());

        assert_eq!(relay.store().get("q1").await.unwrap().screenshot, "abc");
    }

    #[tokio::test]
    async fn test_screenshot_from_non_helper_dropped() {
        let relay = Relay::new();
        let (_receiver, mut receiver_out) = connect_as(&relay, "receiver").await;
        let (other_receiver, _) = connect_as(&relay, "receiver").await;
        let (unregistered, _) = connect(&relay).await;

        let frame = r#"{"type": "screenshot", "questionId": "q1", "screenshot": "abc"}"#;
        for sender in [other_receiver, unregistered] {
            let result = relay.dispatch(sender, frame).await;
            assert!(matches!(
                result,
                Err(DispatchError::RoleMismatch {
                    kind: "screenshot",
                    required: Role::Helper,
                    ..
                })
            ));
        }

        assert!(next_event(&mut receiver_out).is_none());
        assert!(relay.store().get("q1").await.is_none());
    }

    #[tokio::test]
    async fn test_answer_from_receiver_reaches_helpers() {
        let relay = Relay::new();
        let (_helper, mut helper_out) = connect_as(&relay, "helper").await;
        let (receiver, mut receiver_out) = connect_as(&relay, "receiver").await;

        let frame = r#"{"type": "answer", "questionId": "q1", "answer": "C"}"#;
        relay.dispatch(receiver, frame).await.unwrap();

        let event = next_event(&mut helper_out).unwrap();
        assert_eq!(event["type"], "answer");
        assert_eq!(event["questionId"], "q1");
        assert_eq!(event["answer"], "C");
        assert!(event["timestamp"].is_string());
        assert!(next_event(&mut receiver_out).is_none());
    }

    #[tokio::test]
    async fn test_answer_from_non_receiver_dropped() {
        let relay = Relay::new();
        let (helper, mut helper_out) = connect_as(&relay, "helper").await;

        let frame = r#"{"type": "answer", "questionId": "q1", "answer": "C"}"#;
        let err = relay.dispatch(helper, frame).await.unwrap_err();
        assert!(err.to_string().contains("non-receiver"));
        assert!(err.to_string().contains("role: helper"));
        assert!(next_event(&mut helper_out).is_none());
    }

    #[tokio::test]
    async fn test_page_html_not_gated() {
        let relay = Relay::new();
        let (_receiver, mut receiver_out) = connect_as(&relay, "receiver").await;
        let (unregistered, _) = connect(&relay).await;
        let (oddball, _) = connect_as(&relay, "spectator").await;

        for sender in [unregistered, oddball] {
            let frame = r#"{"type": "pageHTML", "html": "<body/>"}"#;
            relay.dispatch(sender, frame).await.unwrap();
            let event = next_event(&mut receiver_out).unwrap();
            assert_eq!(event["type"], "pageHTML");
            assert_eq!(event["html"], "<body/>");
        }
    }

    #[tokio::test]
    async fn test_unknown_type_ignored() {
        let relay = Relay::new();
        let (_receiver, mut receiver_out) = connect_as(&relay, "receiver").await;
        let (helper, _) = connect_as(&relay, "helper").await;

        let result = relay.dispatch(helper, r#"{"type": "heartbeat"}"#).await.unwrap();
        assert_eq!(
            result,
            Dispatched::Ignored {
                kind: Some("heartbeat".to_string())
            }
        );
        assert!(next_event(&mut receiver_out).is_none());
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_registration() {
        let relay = Relay::new();
        let (helper, _) = connect_as(&relay, "helper").await;

        let result = relay.dispatch(helper, "not json at all").await;
        assert!(matches!(result, Err(DispatchError::Protocol(_))));
        assert_eq!(
            relay.registry().lookup(helper).await.unwrap().role,
            Role::Helper
        );
    }
}
