use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_identity::Identity;
use actix_web::web::Data;
use actix_web::{web, HttpRequest};
use actix_web_actors::ws;

use crate::auth::{self, SessionUser};
use crate::server::{Response, State};
use crate::websocket::server;
use crate::websocket::server::ConnectionType;

/// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// How long before lack of client response causes a timeout
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// personal notifications of the logged in user
pub async fn user_route(
    req: HttpRequest,
    stream: web::Payload,
    id: Identity,
    state: Data<State>,
) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    start(ConnectionType::UserConnection, user, req, stream, state)
}

/// booking events of the whole platform
pub async fn admin_route(
    req: HttpRequest,
    stream: web::Payload,
    id: Identity,
    state: Data<State>,
) -> Response {
    let user = auth::verify_admin(&id, &state.db).await?;

    start(ConnectionType::AdminConnection, user, req, stream, state)
}

fn start(
    connection_type: ConnectionType,
    user: SessionUser,
    req: HttpRequest,
    stream: web::Payload,
    state: Data<State>,
) -> Response {
    ws::start(
        WebsocketConnection {
            id: 0,
            hb: Instant::now(),
            connection_type,
            user,
            notifier: state.notifier.clone(),
        },
        &req,
        stream,
    )
    .map_err(|e| e.into())
}

struct WebsocketConnection {
    /// unique session id
    /// Get's filled in when connecting
    id: usize,
    /// Client must send ping at least once per 10 seconds (CLIENT_TIMEOUT),
    /// otherwise we drop connection.
    hb: Instant,
    connection_type: ConnectionType,
    /// Connected user
    user: SessionUser,
    /// notification server
    notifier: Addr<server::NotificationServer>,
}

impl Actor for WebsocketConnection {
    type Context = ws::WebsocketContext<Self>;

    /// Method is called on actor start.
    /// We register ws session with NotificationServer
    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);

        // `AsyncContext::wait` makes sure no notification is handled
        // before the session has its id
        let addr = ctx.address();
        self.notifier
            .send(server::Connect {
                addr: addr.recipient(),
                user: self.user.clone(),
                connection_type: self.connection_type,
            })
            .into_actor(self)
            .then(|res, act, ctx| {
                match res {
                    Ok(res) => act.id = res,
                    // something is wrong with notification server
                    Err(e) => {
                        error!("unable to start websocket connection: {}", e);
                        ctx.stop();
                    }
                }
                fut::ready(())
            })
            .wait(ctx);
        debug!("{} connected to the websocket", self.user.username);
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        self.notifier.do_send(server::Disconnect { id: self.id });
        Running::Stop
    }
}

/// Handle messages from server, we simply send it to peer websocket
impl Handler<server::Notification> for WebsocketConnection {
    type Result = ();

    fn handle(&mut self, notification: server::Notification, ctx: &mut Self::Context) {
        match serde_json::to_string(&notification) {
            Ok(json) => ctx.text(json),
            Err(error) => error!(
                "unable to serialize websocket message: {:?}, error: {}",
                notification, error
            ),
        }
    }
}

/// WebSocket message handler
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WebsocketConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let msg = match msg {
            Err(error) => {
                error!("Invalid websocket protocol message: {}", error);
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Protocol)));
                ctx.stop();
                return;
            }
            Ok(msg) => msg,
        };

        trace!("Websocket received message: {:?}", msg);
        match msg {
            ws::Message::Ping(msg) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            ws::Message::Pong(_) => {
                self.hb = Instant::now();
            }
            // the relay is one way, clients talk to the http api
            ws::Message::Text(_) | ws::Message::Binary(_) => {
                debug!("{} sent an unsupported message", self.user.username);
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Unsupported)));
                ctx.stop();
            }
            ws::Message::Close(reason) => {
                ctx.close(reason);
                ctx.stop();
            }
            ws::Message::Continuation(_) => {
                ctx.stop();
            }
            ws::Message::Nop => (),
        }
    }
}

impl WebsocketConnection {
    /// sends a ping every HEARTBEAT_INTERVAL and drops silent clients
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!(
                    "websocket heartbeat of {} failed, disconnecting",
                    act.user.username
                );

                act.notifier.do_send(server::Disconnect { id: act.id });
                ctx.stop();

                // don't try to send a ping
                return;
            }

            ctx.ping(b"");
        });
    }
}

pub fn register(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ws").route(web::get().to(user_route)));
    cfg.service(web::resource("/admin/ws").route(web::get().to(admin_route)));
}
