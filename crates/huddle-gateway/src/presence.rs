//! Presence events derived from the session directory.
//!
//! The roster is always published whole; clients replace their list on
//! every `update_user_list`. Typing events skip the originating connection
//! and are not debounced. A start without a matching stop stays visible
//! until the supervisor's disconnect cleanup sends the stop.

use huddle_types::events::ServerEvent;
use huddle_types::models::ConnectionId;

use crate::directory::SessionDirectory;
use crate::dispatcher::Outbound;

pub fn publish_roster(directory: &SessionDirectory) -> Outbound {
    Outbound::all(ServerEvent::UpdateUserList(directory.roster()))
}

pub fn publish_typing_start(origin: ConnectionId, display_name: String) -> Outbound {
    Outbound::all_except(origin, ServerEvent::TypingStart { display_name })
}

pub fn publish_typing_stop(origin: ConnectionId, display_name: String) -> Outbound {
    Outbound::all_except(origin, ServerEvent::TypingStop { display_name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Target;
    use huddle_types::models::Participant;

    #[test]
    fn roster_is_a_full_snapshot_for_everyone() {
        let mut dir = SessionDirectory::new();
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        dir.open(a, None);
        dir.open(b, None);
        dir.announce(
            a,
            Participant {
                display_name: "alice".into(),
                avatar_ref: Some("/media/a.png".into()),
            },
        );

        let out = publish_roster(&dir);
        assert_eq!(out.target, Target::All);
        match out.event {
            ServerEvent::UpdateUserList(list) => {
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].display_name, "alice");
                assert_eq!(list[0].avatar_ref.as_deref(), Some("/media/a.png"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn typing_excludes_origin() {
        let a = ConnectionId::new();
        let out = publish_typing_start(a, "alice".into());
        assert_eq!(out.target, Target::AllExcept(a));
        assert!(!out.target.includes(a));

        let out = publish_typing_stop(a, "alice".into());
        assert_eq!(
            out.event,
            ServerEvent::TypingStop {
                display_name: "alice".into()
            }
        );
    }
}
