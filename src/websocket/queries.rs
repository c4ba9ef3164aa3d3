use actix::prelude::*;

use crate::auth::SessionUser;
use crate::websocket::server::NotificationServer;

#[derive(Message)]
#[rtype(usize)]
pub struct ActiveSessionCount;

impl Handler<ActiveSessionCount> for NotificationServer {
    type Result = usize;

    fn handle(&mut self, _: ActiveSessionCount, _: &mut Context<Self>) -> Self::Result {
        self.session_count()
    }
}

#[derive(Message)]
#[rtype(result = "Vec<SessionUser>")]
pub struct ConnectedUsers;

impl Handler<ConnectedUsers> for NotificationServer {
    type Result = MessageResult<ConnectedUsers>;

    fn handle(&mut self, _: ConnectedUsers, _: &mut Context<Self>) -> Self::Result {
        MessageResult(self.connected_users())
    }
}
