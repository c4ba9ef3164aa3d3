use std::collections::{HashMap, HashSet};
use std::fmt;

use actix::prelude::*;
use chrono::{DateTime, Utc};
use rand::{self, rngs::ThreadRng, Rng};

use crate::auth::SessionUser;
use crate::notifications;

pub type SessionId = usize;

/// What kind of updates a websocket connection wants
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectionType {
    /// personal notifications of the connected user
    UserConnection,
    /// every booking event on the platform
    AdminConnection,
}

#[derive(Message)]
#[rtype(usize)]
pub struct Connect {
    pub addr: Recipient<Notification>,
    pub user: SessionUser,
    pub connection_type: ConnectionType,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub id: SessionId,
}

/// A booking changed state
#[derive(Serialize, Debug, Clone)]
pub struct BookingEvent {
    pub booking_id: i64,
    pub court_id: i64,
    pub user_id: i64,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Message, Serialize, Debug, Clone)]
#[rtype(result = "()")]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Notification {
    /// delivered to every session of the notified user
    UserNotification(notifications::Notification),
    /// delivered to the admin sessions
    BookingEvent(BookingEvent),
}

/// Bookkeeping of who is connected, without the actor addresses
#[derive(Debug, Default)]
pub(crate) struct SessionRegistry {
    users: HashMap<SessionId, SessionUser>,
    by_user: HashMap<i64, HashSet<SessionId>>,
    admins: HashSet<SessionId>,
}

impl SessionRegistry {
    pub(crate) fn insert(&mut self, id: SessionId, user: SessionUser, connection: ConnectionType) {
        match connection {
            ConnectionType::UserConnection => {
                self.by_user
                    .entry(user.id)
                    .or_insert_with(HashSet::new)
                    .insert(id);
            }
            ConnectionType::AdminConnection => {
                self.admins.insert(id);
            }
        }
        self.users.insert(id, user);
    }

    /// returns true if the session existed
    pub(crate) fn remove(&mut self, id: SessionId) -> bool {
        let user = match self.users.remove(&id) {
            Some(user) => user,
            None => return false,
        };

        self.admins.remove(&id);

        if let Some(sessions) = self.by_user.get_mut(&user.id) {
            sessions.remove(&id);
            if sessions.is_empty() {
                self.by_user.remove(&user.id);
            }
        }

        true
    }

    /// the sessions that should receive a notification
    pub(crate) fn recipients(&self, notification: &Notification) -> Vec<SessionId> {
        match notification {
            Notification::UserNotification(notification) => self
                .by_user
                .get(&notification.user_id)
                .map(|sessions| sessions.iter().copied().collect())
                .unwrap_or_default(),
            Notification::BookingEvent(_) => self.admins.iter().copied().collect(),
        }
    }

    pub(crate) fn session_count(&self) -> usize {
        self.users.len()
    }

    /// every connected user once, no matter how many sessions they have open
    pub(crate) fn connected_users(&self) -> Vec<SessionUser> {
        let mut seen = HashSet::new();
        let mut users: Vec<SessionUser> = self
            .users
            .values()
            .filter(|user| seen.insert(user.id))
            .cloned()
            .collect();
        users.sort_by_key(|user| user.id);
        users
    }
}

/// `NotificationServer` relays notifications to the connected websocket sessions
pub struct NotificationServer {
    sessions: HashMap<SessionId, Recipient<Notification>>,
    registry: SessionRegistry,
    rng: ThreadRng,
}

impl Default for NotificationServer {
    fn default() -> NotificationServer {
        NotificationServer {
            sessions: HashMap::new(),
            registry: SessionRegistry::default(),
            rng: rand::thread_rng(),
        }
    }
}

impl fmt::Debug for NotificationServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationServer")
            .field("sessions", &self.sessions.len())
            .field("registry", &self.registry)
            .finish()
    }
}

impl NotificationServer {
    fn notify(&self, notification: Notification) {
        for id in self.registry.recipients(&notification) {
            if let Some(addr) = self.sessions.get(&id) {
                if let Err(e) = addr.do_send(notification.clone()) {
                    warn!("unable to notify websocket session {}: {}", id, e);
                }
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }

    pub fn connected_users(&self) -> Vec<SessionUser> {
        self.registry.connected_users()
    }
}

/// Make actor from `NotificationServer`
impl Actor for NotificationServer {
    /// We are going to use simple Context, we just need ability to communicate
    /// with other actors.
    type Context = Context<Self>;
}

/// Handler for Connect message.
///
/// Register new session and assign unique id to this session
impl Handler<Connect> for NotificationServer {
    type Result = usize;

    fn handle(&mut self, msg: Connect, _: &mut Context<Self>) -> Self::Result {
        // register session with random id
        let id = self.rng.gen::<usize>();
        self.sessions.insert(id, msg.addr);
        self.registry.insert(id, msg.user, msg.connection_type);

        id
    }
}

/// Handler for Disconnect message.
impl Handler<Disconnect> for NotificationServer {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        if self.sessions.remove(&msg.id).is_some() {
            self.registry.remove(msg.id);
        }
    }
}

impl Handler<Notification> for NotificationServer {
    type Result = ();

    fn handle(&mut self, notification: Notification, _: &mut Context<Self>) {
        self.notify(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    fn user(id: i64, role: Role) -> SessionUser {
        SessionUser {
            id,
            username: format!("user{}", id),
            role,
        }
    }

    fn notification_for(user_id: i64) -> Notification {
        Notification::UserNotification(notifications::Notification {
            id: 1,
            user_id,
            kind: "booking_confirmed".to_string(),
            title: "Booking confirmed".to_string(),
            message: "see you on court".to_string(),
            is_read: false,
            created_at: Utc::now(),
        })
    }

    fn booking_event() -> Notification {
        Notification::BookingEvent(BookingEvent {
            booking_id: 1,
            court_id: 1,
            user_id: 1,
            status: "pending".to_string(),
            start_time: Utc::now(),
            end_time: Utc::now(),
        })
    }

    #[test]
    fn user_notifications_reach_every_session_of_that_user() {
        let mut registry = SessionRegistry::default();
        registry.insert(1, user(10, Role::Customer), ConnectionType::UserConnection);
        registry.insert(2, user(10, Role::Customer), ConnectionType::UserConnection);
        registry.insert(3, user(11, Role::Customer), ConnectionType::UserConnection);

        let mut recipients = registry.recipients(&notification_for(10));
        recipients.sort();
        assert_eq!(recipients, vec![1, 2]);
        assert!(registry.recipients(&notification_for(12)).is_empty());
    }

    #[test]
    fn booking_events_only_reach_admin_sessions() {
        let mut registry = SessionRegistry::default();
        registry.insert(1, user(10, Role::Admin), ConnectionType::UserConnection);
        registry.insert(2, user(10, Role::Admin), ConnectionType::AdminConnection);

        assert_eq!(registry.recipients(&booking_event()), vec![2]);
    }

    #[test]
    fn disconnecting_cleans_up() {
        let mut registry = SessionRegistry::default();
        registry.insert(1, user(10, Role::Customer), ConnectionType::UserConnection);
        registry.insert(2, user(10, Role::Customer), ConnectionType::UserConnection);

        assert!(registry.remove(1));
        assert!(!registry.remove(1));
        assert_eq!(registry.recipients(&notification_for(10)), vec![2]);

        assert!(registry.remove(2));
        assert_eq!(registry.session_count(), 0);
        assert!(registry.by_user.is_empty());
    }

    #[test]
    fn connected_users_are_unique() {
        let mut registry = SessionRegistry::default();
        registry.insert(1, user(11, Role::Customer), ConnectionType::UserConnection);
        registry.insert(2, user(10, Role::Customer), ConnectionType::UserConnection);
        registry.insert(3, user(11, Role::Customer), ConnectionType::UserConnection);

        let users = registry.connected_users();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, 10);
        assert_eq!(users[1].id, 11);
    }
}
