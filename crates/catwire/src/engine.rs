//! The game client engine.
//!
//! [`GameClient`] owns one connection to the game server and drives the
//! whole conversation: the CHECKIN exchange, the armed reactive-session
//! set (the protocol state), the FIFO proactive queue, the registry, and
//! the event dispatcher.
//!
//! Message delivery is serialized per client by ownership: the client
//! lives on one task and [`handle_message`](GameClient::handle_message)
//! takes `&mut self`, so no lock guards the armed set even though it is
//! reassigned wholesale on every transition. Nothing is shared across
//! client instances except the optional start barrier.
//!
//! The flow on each inbound message:
//!
//! ```text
//! Response ──→ proactive queue head ──→ process, resolve caller,
//!                                       send the next queued request
//! Request  ──→ armed set, in order ──→ first Handled/Invalid stops
//!              (Oracle last: INVALID/WrongTime, state unchanged)
//! ```

use std::sync::Arc;

use catwire_protocol::{
    Header, Message, MessageKind, Role, ShoutId, SpecialistId, Status, TraderId, TransactionId,
    Verb,
};
use catwire_registry::{
    ClientRegistry, FeeSchedule, MarketRegistry, RegistryError, Shout, ShoutState, TraderRegistry,
    Transaction,
};
use catwire_session::{ProactiveQueue, ProactiveSession, SessionError, SessionOutcome, TagCell};
use catwire_sync::StartBarrier;
use catwire_transport::{Connection, Connector, TransportError};
use tokio::sync::mpsc;

use crate::event::{AuctionEvent, Dispatcher, EventListener};
use crate::market::{Auctioneer, TradeProposal};
use crate::phase::{armed_for, Phase, ReactiveKind};
use crate::trader::{TraderCommand, TraderHandle};
use crate::{CatwireError, ClientConfig};

/// Context kept with each proactive request until its response arrives.
#[derive(Debug, Clone)]
pub enum ProactiveKind {
    /// The initial CHECKIN exchange.
    CheckIn,
    /// Trader registering with a specialist.
    Register(SpecialistId),
    /// Trader subscribing to a specialist's feed.
    Subscribe(SpecialistId),
    /// A shout being placed or modified.
    Shout(ShoutRequest),
    /// A market asking the server to record a trade.
    Transaction(TradeProposal),
}

/// What a pending ASK/BID request meant, so the response handler can
/// record the outcome.
#[derive(Debug, Clone)]
pub struct ShoutRequest {
    pub price: f64,
    pub quantity: u32,
    pub is_bid: bool,
    /// `Some` when this request modifies a standing shout.
    pub modifies: Option<ShoutId>,
}

/// Role-specific state and collaborators.
enum RoleState {
    Trader {
        registry: TraderRegistry,
        commands: mpsc::UnboundedReceiver<TraderCommand>,
        commands_open: bool,
    },
    Market {
        registry: MarketRegistry,
        auctioneer: Box<dyn Auctioneer>,
    },
}

/// What the run loop should do next.
enum Step {
    Inbound(Message),
    PeerClosed,
    Command(TraderCommand),
    CommandsClosed,
}

/// A client-side CATP protocol engine, generic over the transport.
pub struct GameClient<T: Connector> {
    connector: T,
    conn: Option<T::Conn>,
    config: ClientConfig,
    phase: Phase,
    armed: Vec<ReactiveKind>,
    proactive: ProactiveQueue<ProactiveKind, CatwireError>,
    tag: TagCell,
    dispatcher: Dispatcher,
    role: RoleState,
    barrier: Option<Arc<StartBarrier>>,
    id: Option<String>,
    day: u32,
    round: u32,
}

impl<T: Connector> GameClient<T> {
    /// Creates a trader-role engine and the handle its strategy talks
    /// through.
    pub fn trader(connector: T, mut config: ClientConfig) -> (Self, TraderHandle) {
        config.role = Role::Trader;
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Self::new(
            connector,
            config,
            RoleState::Trader {
                registry: TraderRegistry::new(),
                commands: rx,
                commands_open: true,
            },
        );
        (client, TraderHandle::new(tx))
    }

    /// Creates a market-role engine around an [`Auctioneer`] collaborator.
    pub fn market(connector: T, mut config: ClientConfig, auctioneer: Box<dyn Auctioneer>) -> Self {
        config.role = Role::Specialist;
        Self::new(
            connector,
            config,
            RoleState::Market {
                registry: MarketRegistry::new(),
                auctioneer,
            },
        )
    }

    fn new(connector: T, config: ClientConfig, role: RoleState) -> Self {
        Self {
            connector,
            conn: None,
            config,
            phase: Phase::Disconnected,
            armed: Vec::new(),
            proactive: ProactiveQueue::new(),
            tag: TagCell::new(),
            dispatcher: Dispatcher::new(),
            role,
            barrier: None,
            id: None,
            day: 0,
            round: 0,
        }
    }

    // -- Wiring -----------------------------------------------------------

    /// Registers a listener for every locally generated auction event.
    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) {
        self.dispatcher.add_listener(listener);
    }

    /// Attaches the start-of-game barrier this client counts into after a
    /// successful check-in.
    pub fn set_barrier(&mut self, barrier: Arc<StartBarrier>) {
        self.barrier = Some(barrier);
    }

    // -- Introspection ----------------------------------------------------

    /// The current protocol phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The currently armed reactive-session set, in match order.
    pub fn armed(&self) -> &[ReactiveKind] {
        &self.armed
    }

    /// The identity established at check-in.
    pub fn client_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The current day number.
    pub fn day(&self) -> u32 {
        self.day
    }

    /// The current round number within the day.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// The shared registry view, regardless of role.
    pub fn registry(&self) -> &ClientRegistry {
        match &self.role {
            RoleState::Trader { registry, .. } => &registry.core,
            RoleState::Market { registry, .. } => &registry.core,
        }
    }

    /// The trader-side registry, when this is a trader client.
    pub fn trader_registry(&self) -> Option<&TraderRegistry> {
        match &self.role {
            RoleState::Trader { registry, .. } => Some(registry),
            RoleState::Market { .. } => None,
        }
    }

    /// The market-side registry, when this is a market client.
    pub fn market_registry(&self) -> Option<&MarketRegistry> {
        match &self.role {
            RoleState::Market { registry, .. } => Some(registry),
            RoleState::Trader { .. } => None,
        }
    }

    // -- Connection lifecycle ---------------------------------------------

    /// Dials the server, retrying a bounded number of times with a fixed
    /// delay, then sends CHECKIN as the first proactive session.
    ///
    /// # Errors
    /// [`CatwireError::ConnectExhausted`] once every attempt failed.
    pub async fn connect(&mut self) -> Result<(), CatwireError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let trials = self.config.conn_trials_max.max(1);
        let mut last: Option<TransportError> = None;
        for attempt in 1..=trials {
            match self.connector.connect().await {
                Ok(conn) => {
                    tracing::info!(
                        conn = %conn.id(),
                        attempt,
                        role = %self.config.role,
                        "transport connected"
                    );
                    self.conn = Some(conn);
                    break;
                }
                Err(e) => {
                    tracing::warn!(attempt, trials, error = %e, "connect attempt failed");
                    last = Some(e);
                    if attempt < trials {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }
        if self.conn.is_none() {
            return Err(CatwireError::ConnectExhausted {
                attempts: trials,
                source: last.expect("a failed attempt preceded exhaustion"),
            });
        }

        let mut checkin = Message::request(Verb::CheckIn)
            .with_header(Header::Type, self.config.role.as_wire())
            .with_header(Header::Version, self.config.version.to_string());
        if let Some(proposed) = &self.config.proposed_id {
            checkin = checkin.with_header(Header::Id, proposed.clone());
        }
        self.submit(ProactiveSession::new(ProactiveKind::CheckIn, checkin))
            .await
    }

    /// Clears all pending proactive sessions (failing their callers rather
    /// than leaving them hanging), empties the armed set, and tears down
    /// the connection. The client never reconnects by itself; recovery is
    /// the surrounding supervisor's job.
    pub async fn close(&mut self) {
        let abandoned = self.proactive.force_out();
        if abandoned > 0 {
            tracing::warn!(abandoned, "pending proactive sessions forced out");
        }
        self.transition(Phase::Disconnected);
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "error while closing connection");
            }
        }
    }

    /// Connects, then serves inbound messages and local commands until the
    /// server closes the connection or an unrecoverable error occurs.
    pub async fn run(&mut self) -> Result<(), CatwireError> {
        self.connect().await?;
        loop {
            let step = match self.next_step().await {
                Ok(step) => step,
                Err(e) => {
                    tracing::error!(error = %e, "transport failure; closing");
                    self.close().await;
                    return Err(e);
                }
            };
            let result = match step {
                Step::Inbound(msg) => self.handle_message(msg).await,
                Step::PeerClosed => {
                    tracing::info!("server closed the connection");
                    self.close().await;
                    return Ok(());
                }
                Step::Command(cmd) => self.handle_command(cmd).await,
                Step::CommandsClosed => {
                    if let RoleState::Trader { commands_open, .. } = &mut self.role {
                        *commands_open = false;
                    }
                    Ok(())
                }
            };
            if let Err(e) = result {
                // close() is idempotent; a handler that already closed is
                // left alone, anything else is torn down now.
                self.close().await;
                return Err(e);
            }
        }
    }

    async fn next_step(&mut self) -> Result<Step, CatwireError> {
        let conn = self.conn.as_mut().ok_or(CatwireError::NotConnected)?;
        match &mut self.role {
            RoleState::Trader {
                commands,
                commands_open: true,
                ..
            } => {
                tokio::select! {
                    inbound = conn.recv() => step_from_recv(inbound),
                    cmd = commands.recv() => Ok(match cmd {
                        Some(cmd) => Step::Command(cmd),
                        None => Step::CommandsClosed,
                    }),
                }
            }
            _ => step_from_recv(conn.recv().await),
        }
    }

    /// Awaits and executes one command from the role handle. Exposed so a
    /// harness can drive the engine without running the full loop.
    pub async fn process_next_command(&mut self) -> Result<(), CatwireError> {
        let cmd = {
            let RoleState::Trader { commands, .. } = &mut self.role else {
                return Ok(());
            };
            commands.recv().await
        };
        match cmd {
            Some(cmd) => self.handle_command(cmd).await,
            None => Err(CatwireError::CommandChannelClosed),
        }
    }

    // -- Message arrival --------------------------------------------------

    /// Delivers one inbound message to the engine: responses resolve the
    /// proactive queue head, requests are trial-matched against the armed
    /// reactive-session set.
    pub async fn handle_message(&mut self, msg: Message) -> Result<(), CatwireError> {
        tracing::trace!(%msg, "message arrived");
        match msg.kind {
            MessageKind::Response(_) => self.handle_response(msg).await,
            MessageKind::Request(_) => self.handle_request(msg).await,
        }
    }

    async fn handle_response(&mut self, msg: Message) -> Result<(), CatwireError> {
        let Some(session) = self.proactive.take_head() else {
            tracing::error!(%msg, "response with no proactive session in flight; closing");
            self.close().await;
            return Err(SessionError::EmptyQueue.into());
        };

        let outcome = self.process_response(&session.kind, &msg).await;
        session.resolve(Ok(msg));
        outcome?;

        // Strictly one request in flight: the next queued one goes out now.
        if let Some(next) = self.proactive.next_request().cloned() {
            let next = self.tag.stamp(next);
            self.send(&next).await?;
        }
        Ok(())
    }

    async fn handle_request(&mut self, msg: Message) -> Result<(), CatwireError> {
        self.tag.observe(&msg);
        let armed = self.armed.clone();
        for kind in armed {
            if !kind.expectation().matches(&msg) {
                continue;
            }
            match self.apply_reactive(kind, &msg).await? {
                SessionOutcome::NotApplicable => continue,
                SessionOutcome::Invalid(reason) => {
                    tracing::warn!(session = ?kind, %msg, %reason, "recognized request rejected");
                    let response =
                        Message::response(Status::Error).with_header(Header::Text, reason);
                    return self.respond(response).await;
                }
                SessionOutcome::Handled => return Ok(()),
            }
        }
        // Unreachable while the Oracle is armed; only a disconnected
        // client has an empty set.
        tracing::warn!(%msg, "request arrived with nothing armed; dropping");
        Ok(())
    }

    // -- Proactive sessions -----------------------------------------------

    /// Enqueues a proactive session and sends its request if it became the
    /// head of the queue.
    async fn submit(
        &mut self,
        session: ProactiveSession<ProactiveKind, CatwireError>,
    ) -> Result<(), CatwireError> {
        let now_head = self.proactive.push(session);
        if now_head {
            let request = self
                .proactive
                .next_request()
                .expect("session was just pushed")
                .clone();
            let request = self.tag.stamp(request);
            self.send(&request).await?;
        }
        Ok(())
    }

    async fn submit_transaction(&mut self, proposal: TradeProposal) -> Result<(), CatwireError> {
        tracing::info!(
            ask = %proposal.ask,
            bid = %proposal.bid,
            price = proposal.price,
            "requesting transaction"
        );
        let msg = Message::request(Verb::Transaction)
            .with_header(Header::Id, format!("{} {}", proposal.ask, proposal.bid))
            .with_header(
                Header::Value,
                format!("{} {}", proposal.price, proposal.quantity),
            );
        self.submit(ProactiveSession::new(
            ProactiveKind::Transaction(proposal),
            msg,
        ))
        .await
    }

    async fn process_response(
        &mut self,
        kind: &ProactiveKind,
        msg: &Message,
    ) -> Result<(), CatwireError> {
        let status = msg.status().unwrap_or(Status::Error);
        match kind {
            ProactiveKind::CheckIn => self.complete_check_in(status, msg).await,
            ProactiveKind::Register(specialist) => {
                if status == Status::Ok {
                    tracing::info!(%specialist, "registration accepted");
                    if let RoleState::Trader { registry, .. } = &mut self.role {
                        registry.set_registered(specialist.clone());
                    }
                } else {
                    tracing::warn!(%specialist, %status, "registration refused");
                }
                Ok(())
            }
            ProactiveKind::Subscribe(specialist) => {
                if status == Status::Ok {
                    tracing::info!(%specialist, "subscription accepted");
                } else {
                    tracing::warn!(%specialist, %status, "subscription refused");
                }
                Ok(())
            }
            ProactiveKind::Shout(request) => {
                self.complete_shout(status, request.clone(), msg);
                Ok(())
            }
            ProactiveKind::Transaction(proposal) => {
                if status != Status::Ok {
                    tracing::warn!(
                        ask = %proposal.ask,
                        bid = %proposal.bid,
                        %status,
                        "transaction refused"
                    );
                }
                Ok(())
            }
        }
    }

    async fn complete_check_in(
        &mut self,
        status: Status,
        msg: &Message,
    ) -> Result<(), CatwireError> {
        if status != Status::Ok {
            let reason = msg.header(Header::Text).unwrap_or("refused").to_string();
            tracing::error!(%reason, "check-in refused");
            self.close().await;
            return Err(CatwireError::CheckInFailed(reason));
        }

        let id = msg
            .header(Header::Id)
            .map(str::to_string)
            .or_else(|| self.config.proposed_id.clone());
        let Some(id) = id else {
            tracing::error!("check-in OK carried no identity and none was proposed");
            self.close().await;
            return Err(CatwireError::CheckInFailed("no identity assigned".into()));
        };

        tracing::info!(client = %id, role = %self.config.role, "checked in");
        self.id = Some(id.clone());
        self.transition(Phase::CheckedIn);
        self.dispatch(AuctionEvent::CheckedIn { id });

        // Rendezvous with the other locally launched clients before the
        // game may open; the barrier has done its job after that.
        if let Some(barrier) = self.barrier.take() {
            barrier.count_me();
            barrier.wait_for_clients().await;
        }
        Ok(())
    }

    fn complete_shout(&mut self, status: Status, request: ShoutRequest, msg: &Message) {
        let own_id = self.id.clone();
        let RoleState::Trader { registry, .. } = &mut self.role else {
            tracing::warn!("shout response arrived on a market client");
            return;
        };
        match (&request.modifies, status) {
            (None, Status::Ok) => {
                let Some(shout_id) = msg.header(Header::Id) else {
                    tracing::warn!("shout accepted without an id; cannot record it");
                    return;
                };
                let Some(specialist) = registry.registered_with().cloned() else {
                    tracing::warn!(shout = %shout_id, "shout accepted while unregistered");
                    return;
                };
                let Some(own_id) = own_id else {
                    tracing::warn!(shout = %shout_id, "shout accepted before check-in");
                    return;
                };
                let shout = Shout::new(
                    ShoutId::from(shout_id),
                    request.price,
                    request.quantity,
                    request.is_bid,
                    TraderId::from(own_id),
                    specialist,
                );
                tracing::info!(shout = %shout.id, price = shout.price, "shout placed");
                registry.shout_placed(shout);
            }
            (None, _) => {
                tracing::debug!(%status, "shout refused");
            }
            (Some(shout_id), Status::Ok) => {
                if let Err(e) = registry.modification_confirmed(shout_id) {
                    tracing::warn!(shout = %shout_id, error = %e, "dangling modification confirmation");
                }
            }
            (Some(shout_id), _) => {
                if let Err(e) = registry.modification_rejected(shout_id) {
                    tracing::warn!(shout = %shout_id, error = %e, "dangling modification rejection");
                } else {
                    tracing::debug!(shout = %shout_id, %status, "modification refused; parent stands");
                }
            }
        }
    }

    // -- Local commands ---------------------------------------------------

    async fn handle_command(&mut self, cmd: TraderCommand) -> Result<(), CatwireError> {
        match cmd {
            TraderCommand::Register { specialist, reply } => {
                let msg =
                    Message::request(Verb::Register).with_header(Header::Id, specialist.as_str());
                self.submit(ProactiveSession::with_reply(
                    ProactiveKind::Register(specialist),
                    msg,
                    reply,
                ))
                .await
            }
            TraderCommand::Subscribe { specialist, reply } => {
                let msg =
                    Message::request(Verb::Subscribe).with_header(Header::Id, specialist.as_str());
                self.submit(ProactiveSession::with_reply(
                    ProactiveKind::Subscribe(specialist),
                    msg,
                    reply,
                ))
                .await
            }
            TraderCommand::Place {
                price,
                quantity,
                is_bid,
                reply,
            } => {
                let allowed = match &self.role {
                    RoleState::Trader { registry, .. } => registry.ensure_can_place(),
                    RoleState::Market { .. } => Ok(()),
                };
                if let Err(e) = allowed {
                    // Rejected locally; the server is never contacted.
                    let _ = reply.send(Err(e.into()));
                    return Ok(());
                }
                let verb = if is_bid { Verb::Bid } else { Verb::Ask };
                let msg = Message::request(verb)
                    .with_header(Header::Value, format!("{price} {quantity}"));
                self.submit(ProactiveSession::with_reply(
                    ProactiveKind::Shout(ShoutRequest {
                        price,
                        quantity,
                        is_bid,
                        modifies: None,
                    }),
                    msg,
                    reply,
                ))
                .await
            }
            TraderCommand::Modify {
                shout,
                price,
                reply,
            } => {
                let RoleState::Trader { registry, .. } = &mut self.role else {
                    let _ = reply.send(Err(RegistryError::UnknownShout(shout).into()));
                    return Ok(());
                };
                if let Err(e) = registry.begin_modification(&shout, price) {
                    // Rejected locally; the server is never contacted.
                    let _ = reply.send(Err(e.into()));
                    return Ok(());
                }
                let parent = registry
                    .core
                    .shout(&shout)
                    .expect("modification was just attached");
                let is_bid = parent.is_bid;
                let quantity = parent.quantity;
                let verb = if is_bid { Verb::Bid } else { Verb::Ask };
                let msg = Message::request(verb)
                    .with_header(Header::Id, shout.as_str())
                    .with_header(Header::Value, format!("{price} {quantity}"));
                self.submit(ProactiveSession::with_reply(
                    ProactiveKind::Shout(ShoutRequest {
                        price,
                        quantity,
                        is_bid,
                        modifies: Some(shout),
                    }),
                    msg,
                    reply,
                ))
                .await
            }
        }
    }

    // -- Reactive sessions ------------------------------------------------

    async fn apply_reactive(
        &mut self,
        kind: ReactiveKind,
        msg: &Message,
    ) -> Result<SessionOutcome, CatwireError> {
        match kind {
            ReactiveKind::GameStarting => self.on_game_starting(msg).await,
            ReactiveKind::GameStarted => self.on_game_started(msg).await,
            ReactiveKind::DayOpening => self.on_day_opening(msg).await,
            ReactiveKind::DayOpened => self.on_day_opened(msg).await,
            ReactiveKind::RoundOpened => self.on_round_opened(msg).await,
            ReactiveKind::RoundClosing => self.on_round_closing(msg).await,
            ReactiveKind::RoundClosed => self.on_round_closed(msg).await,
            ReactiveKind::DayClosed => self.on_day_closed(msg).await,
            ReactiveKind::GameOver => self.on_game_over(msg).await,
            ReactiveKind::PostTrader => self.on_post_trader(msg).await,
            ReactiveKind::PostSpecialist => self.on_post_specialist(msg).await,
            ReactiveKind::PostFee => self.on_post_fee(msg).await,
            ReactiveKind::PostProfit => self.on_post_profit(msg).await,
            ReactiveKind::PostAsk => self.on_post_shout(msg, false).await,
            ReactiveKind::PostBid => self.on_post_shout(msg, true).await,
            ReactiveKind::PostTransaction => self.on_post_transaction(msg).await,
            ReactiveKind::RegisterNotice => self.on_register_notice(msg).await,
            ReactiveKind::SubscribeNotice => self.on_subscribe_notice(msg).await,
            ReactiveKind::Sync => self.on_sync(msg).await,
            ReactiveKind::Oracle => self.on_oracle(msg).await,
        }
    }

    async fn on_game_starting(&mut self, _msg: &Message) -> Result<SessionOutcome, CatwireError> {
        self.registry_game_starting();
        self.day = 0;
        self.round = 0;
        self.transition(Phase::GameStarting);
        self.dispatch(AuctionEvent::GameStarting);
        self.respond_ok().await?;
        Ok(SessionOutcome::Handled)
    }

    async fn on_game_started(&mut self, _msg: &Message) -> Result<SessionOutcome, CatwireError> {
        self.transition(Phase::GameStarted);
        self.dispatch(AuctionEvent::GameStarted);
        self.respond_ok().await?;
        Ok(SessionOutcome::Handled)
    }

    async fn on_day_opening(&mut self, msg: &Message) -> Result<SessionOutcome, CatwireError> {
        let day = header_number(msg, Header::Time).unwrap_or(self.day + 1);
        self.day = day;
        self.round = 0;
        self.registry_day_opening();
        self.transition(Phase::DayOpening);
        self.dispatch(AuctionEvent::DayOpening { day });
        self.respond_ok().await?;
        Ok(SessionOutcome::Handled)
    }

    async fn on_day_opened(&mut self, msg: &Message) -> Result<SessionOutcome, CatwireError> {
        // A trader's private value for the day rides in on this message.
        let mut private_value = None;
        if matches!(self.role, RoleState::Trader { .. }) {
            if let Some(raw) = msg.header(Header::Value) {
                match raw.parse::<f64>() {
                    Ok(value) => private_value = Some(value),
                    Err(_) => {
                        return Ok(SessionOutcome::Invalid(format!(
                            "bad private value {raw:?}"
                        )));
                    }
                }
            }
        }
        if let Some(value) = private_value {
            if let RoleState::Trader { registry, .. } = &mut self.role {
                registry.set_private_value(value);
            }
            self.dispatch(AuctionEvent::PrivateValueAssigned { value });
        }
        let day = self.day;
        self.transition(Phase::DayOpened);
        self.dispatch(AuctionEvent::DayOpened { day });
        self.respond_ok().await?;
        Ok(SessionOutcome::Handled)
    }

    async fn on_round_opened(&mut self, msg: &Message) -> Result<SessionOutcome, CatwireError> {
        let round = header_number(msg, Header::Time).unwrap_or(self.round + 1);
        self.round = round;
        let day = self.day;
        self.transition(Phase::RoundOpened);
        self.dispatch(AuctionEvent::RoundOpened { day, round });
        self.respond_ok().await?;
        Ok(SessionOutcome::Handled)
    }

    async fn on_round_closing(&mut self, _msg: &Message) -> Result<SessionOutcome, CatwireError> {
        let (day, round) = (self.day, self.round);
        self.transition(Phase::RoundClosing);
        self.dispatch(AuctionEvent::RoundClosing { day, round });
        self.respond_ok().await?;
        Ok(SessionOutcome::Handled)
    }

    async fn on_round_closed(&mut self, _msg: &Message) -> Result<SessionOutcome, CatwireError> {
        let (day, round) = (self.day, self.round);
        self.transition(Phase::RoundClosed);
        self.dispatch(AuctionEvent::RoundClosed { day, round });
        self.respond_ok().await?;

        // A market may clear its book at the round boundary; the server
        // has seen our OK, so the transaction requests may follow.
        let proposals = match &mut self.role {
            RoleState::Market { auctioneer, .. } => auctioneer.round_closed(),
            RoleState::Trader { .. } => Vec::new(),
        };
        for proposal in proposals {
            self.submit_transaction(proposal).await?;
        }
        Ok(SessionOutcome::Handled)
    }

    async fn on_day_closed(&mut self, msg: &Message) -> Result<SessionOutcome, CatwireError> {
        let pairs = match parse_popularity(msg) {
            Ok(pairs) => pairs,
            Err(reason) => return Ok(SessionOutcome::Invalid(reason)),
        };
        if let Some(day) = header_number(msg, Header::Time) {
            self.day = day;
        }

        for (specialist, count) in pairs {
            let core = self.core_mut();
            core.announce_specialist(specialist.clone());
            core.specialist_mut(&specialist).popularity = count;
            self.dispatch(AuctionEvent::RegisteredTradersAnnounced { specialist, count });
        }

        let day = self.day;
        self.transition(Phase::DayClosed);
        self.dispatch(AuctionEvent::DayClosed { day });
        self.respond_ok().await?;
        Ok(SessionOutcome::Handled)
    }

    async fn on_game_over(&mut self, _msg: &Message) -> Result<SessionOutcome, CatwireError> {
        self.transition(Phase::CheckedIn);
        self.dispatch(AuctionEvent::GameOver);
        self.respond_ok().await?;
        Ok(SessionOutcome::Handled)
    }

    /// Mid-game reconnection: an OPTIONS DayClosed arriving while the
    /// client is still cold means whole transitions were missed. The
    /// missing events are synthesized locally so listeners observe a
    /// coherent sequence, then the normal day-closed handling runs.
    async fn on_sync(&mut self, msg: &Message) -> Result<SessionOutcome, CatwireError> {
        tracing::info!(phase = %self.phase, "day closed arrived cold; resynchronizing");
        self.registry_game_starting();
        self.dispatch(AuctionEvent::GameStarting);
        self.dispatch(AuctionEvent::GameStarted);
        self.on_day_closed(msg).await
    }

    async fn on_post_trader(&mut self, msg: &Message) -> Result<SessionOutcome, CatwireError> {
        let Some(id) = msg.header(Header::Id) else {
            return Ok(SessionOutcome::Invalid("missing ID header".into()));
        };
        let is_seller = match msg.header(Header::Value) {
            Some("1") => true,
            Some("0") | None => false,
            Some(other) => {
                return Ok(SessionOutcome::Invalid(format!(
                    "bad seller flag {other:?}"
                )));
            }
        };
        let trader = TraderId::from(id);
        self.core_mut().announce_trader(trader.clone(), is_seller);
        self.dispatch(AuctionEvent::TraderAnnounced { trader, is_seller });
        self.respond_ok().await?;
        Ok(SessionOutcome::Handled)
    }

    async fn on_post_specialist(&mut self, msg: &Message) -> Result<SessionOutcome, CatwireError> {
        let Some(id) = msg.header(Header::Id) else {
            return Ok(SessionOutcome::Invalid("missing ID header".into()));
        };
        let specialist = SpecialistId::from(id);
        self.core_mut().announce_specialist(specialist.clone());
        self.dispatch(AuctionEvent::SpecialistAnnounced { specialist });
        self.respond_ok().await?;
        Ok(SessionOutcome::Handled)
    }

    async fn on_post_fee(&mut self, msg: &Message) -> Result<SessionOutcome, CatwireError> {
        let Some(id) = msg.header(Header::Id) else {
            return Ok(SessionOutcome::Invalid("missing ID header".into()));
        };
        let Some(value) = msg.header(Header::Value) else {
            return Ok(SessionOutcome::Invalid("missing VALUE header".into()));
        };
        let fees = match FeeSchedule::from_wire(value) {
            Ok(fees) => fees,
            Err(e) => return Ok(SessionOutcome::Invalid(e.to_string())),
        };
        let specialist = SpecialistId::from(id);
        self.core_mut().specialist_mut(&specialist).fees = Some(fees);
        self.dispatch(AuctionEvent::FeePosted { specialist, fees });
        self.respond_ok().await?;
        Ok(SessionOutcome::Handled)
    }

    async fn on_post_profit(&mut self, msg: &Message) -> Result<SessionOutcome, CatwireError> {
        let Some(id) = msg.header(Header::Id) else {
            return Ok(SessionOutcome::Invalid("missing ID header".into()));
        };
        let profit = match msg.header(Header::Value).map(str::parse::<f64>) {
            Some(Ok(profit)) => profit,
            _ => return Ok(SessionOutcome::Invalid("bad profit value".into())),
        };
        let specialist = SpecialistId::from(id);
        self.core_mut().specialist_mut(&specialist).profit = profit;
        self.dispatch(AuctionEvent::ProfitPosted { specialist, profit });
        self.respond_ok().await?;
        Ok(SessionOutcome::Handled)
    }

    async fn on_post_shout(
        &mut self,
        msg: &Message,
        is_bid: bool,
    ) -> Result<SessionOutcome, CatwireError> {
        let shout = match parse_posted_shout(msg, is_bid) {
            Ok(shout) => shout,
            Err(reason) => return Ok(SessionOutcome::Invalid(reason)),
        };

        let is_market = matches!(self.role, RoleState::Market { .. });
        if is_market {
            // The server must see our OK before any transaction request
            // this shout triggers can arrive.
            self.respond_ok().await?;
        }

        let proposals = match &mut self.role {
            RoleState::Market {
                registry,
                auctioneer,
            } => {
                if registry.core.shout(&shout.id).is_some() {
                    // A re-post replaces the standing version in the book.
                    auctioneer.remove_shout(&shout.id);
                }
                registry.core.shout_posted(shout.clone());
                // Only standing shouts enter the book; matched or rejected
                // echoes just update the registry.
                if shout.state == ShoutState::Placed {
                    auctioneer.new_shout(&shout)
                } else {
                    Vec::new()
                }
            }
            RoleState::Trader { registry, .. } => {
                registry.core.shout_posted(shout.clone());
                Vec::new()
            }
        };
        self.dispatch(AuctionEvent::ShoutPosted { shout });

        for proposal in proposals {
            self.submit_transaction(proposal).await?;
        }

        if !is_market {
            self.respond_ok().await?;
        }
        Ok(SessionOutcome::Handled)
    }

    async fn on_post_transaction(&mut self, msg: &Message) -> Result<SessionOutcome, CatwireError> {
        let transaction = match parse_posted_transaction(msg) {
            Ok(transaction) => transaction,
            Err(reason) => return Ok(SessionOutcome::Invalid(reason)),
        };

        let own = self.id.clone().map(TraderId::from);
        let (ask, bid) = (transaction.ask.clone(), transaction.bid.clone());
        match &mut self.role {
            RoleState::Market {
                registry,
                auctioneer,
            } => {
                registry.core.transaction_posted(transaction.clone());
                // Matched shouts leave the book.
                auctioneer.remove_shout(&ask);
                auctioneer.remove_shout(&bid);
            }
            RoleState::Trader { registry, .. } => {
                registry.core.transaction_posted(transaction.clone());
                if let Some(own) = own {
                    settle_own_trade(registry, &own, &transaction);
                }
            }
        }
        self.dispatch(AuctionEvent::TransactionPosted { transaction });
        self.respond_ok().await?;
        Ok(SessionOutcome::Handled)
    }

    async fn on_register_notice(&mut self, msg: &Message) -> Result<SessionOutcome, CatwireError> {
        let Some(id) = msg.header(Header::Id) else {
            return Ok(SessionOutcome::Invalid("missing ID header".into()));
        };
        let trader = TraderId::from(id);
        let own_id = self.id.clone();
        let RoleState::Market { registry, .. } = &mut self.role else {
            return Ok(SessionOutcome::NotApplicable);
        };
        {
            let record = registry.core.trader_mut(&trader);
            record.registered_with = own_id.map(SpecialistId::from);
        }
        registry.register_trader(trader.clone());
        self.dispatch(AuctionEvent::RegistrationNotice { trader });
        self.respond_ok().await?;
        Ok(SessionOutcome::Handled)
    }

    async fn on_subscribe_notice(&mut self, msg: &Message) -> Result<SessionOutcome, CatwireError> {
        let Some(id) = msg.header(Header::Id) else {
            return Ok(SessionOutcome::Invalid("missing ID header".into()));
        };
        let trader = TraderId::from(id);
        let RoleState::Market { registry, .. } = &mut self.role else {
            return Ok(SessionOutcome::NotApplicable);
        };
        registry.core.trader_mut(&trader);
        registry.subscribe_trader(trader.clone());
        self.dispatch(AuctionEvent::SubscriptionNotice { trader });
        self.respond_ok().await?;
        Ok(SessionOutcome::Handled)
    }

    /// The catch-all: logs, answers INVALID/WrongTime, changes nothing.
    async fn on_oracle(&mut self, msg: &Message) -> Result<SessionOutcome, CatwireError> {
        tracing::warn!(%msg, phase = %self.phase, "request outside the armed set");
        self.respond(Message::wrong_time()).await?;
        Ok(SessionOutcome::Handled)
    }

    // -- Plumbing ---------------------------------------------------------

    fn transition(&mut self, phase: Phase) {
        self.phase = phase;
        self.armed = armed_for(phase, self.config.role);
        tracing::debug!(%phase, armed = self.armed.len(), "protocol state advanced");
    }

    fn dispatch(&mut self, event: AuctionEvent) {
        self.dispatcher.dispatch(&event);
    }

    fn registry_game_starting(&mut self) {
        match &mut self.role {
            RoleState::Trader { registry, .. } => registry.game_starting(),
            RoleState::Market { registry, .. } => registry.game_starting(),
        }
    }

    fn registry_day_opening(&mut self) {
        match &mut self.role {
            RoleState::Trader { registry, .. } => registry.day_opening(),
            RoleState::Market { registry, .. } => registry.day_opening(),
        }
    }

    fn core_mut(&mut self) -> &mut ClientRegistry {
        match &mut self.role {
            RoleState::Trader { registry, .. } => &mut registry.core,
            RoleState::Market { registry, .. } => &mut registry.core,
        }
    }

    async fn send(&mut self, msg: &Message) -> Result<(), CatwireError> {
        let conn = self.conn.as_mut().ok_or(CatwireError::NotConnected)?;
        tracing::trace!(%msg, "send");
        conn.send(msg).await.map_err(Into::into)
    }

    async fn respond(&mut self, response: Message) -> Result<(), CatwireError> {
        let response = self.tag.stamp(response);
        self.send(&response).await
    }

    async fn respond_ok(&mut self) -> Result<(), CatwireError> {
        self.respond(Message::response(Status::Ok)).await
    }
}

fn step_from_recv(result: Result<Option<Message>, TransportError>) -> Result<Step, CatwireError> {
    match result {
        Ok(Some(msg)) => Ok(Step::Inbound(msg)),
        Ok(None) => Ok(Step::PeerClosed),
        Err(e) => Err(e.into()),
    }
}

fn header_number(msg: &Message, header: Header) -> Option<u32> {
    msg.header(header).and_then(|raw| raw.parse().ok())
}

/// Adjusts the trader's own balance for a recorded trade it took part in:
/// the seller is credited the trade value, the buyer debited.
fn settle_own_trade(registry: &mut TraderRegistry, own: &TraderId, transaction: &Transaction) {
    let value = transaction.price * f64::from(transaction.quantity);
    for (shout_id, credit) in [(&transaction.ask, value), (&transaction.bid, -value)] {
        let involved = registry
            .core
            .shout(shout_id)
            .is_some_and(|shout| &shout.trader == own);
        if involved {
            registry.core.trader_mut(own).balance += credit;
            tracing::debug!(trader = %own, credit, "trade settled against own balance");
        }
    }
}

fn parse_posted_shout(msg: &Message, is_bid: bool) -> Result<Shout, String> {
    let id = msg
        .header(Header::Id)
        .ok_or_else(|| "missing ID header".to_string())?;
    let value = msg
        .header(Header::Value)
        .ok_or_else(|| "missing VALUE header".to_string())?;
    let mut parts = value.split_whitespace();
    let price: f64 = parts
        .next()
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| format!("bad shout value {value:?}"))?;
    let quantity: u32 = match parts.next() {
        None => 1,
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("bad shout value {value:?}"))?,
    };
    let state = match parts.next() {
        None => ShoutState::Placed,
        Some(raw) => ShoutState::from_wire(raw).ok_or_else(|| format!("bad shout state {raw:?}"))?,
    };
    let text = msg
        .header(Header::Text)
        .ok_or_else(|| "missing TEXT header".to_string())?;
    let mut owners = text.split_whitespace();
    let trader = owners
        .next()
        .ok_or_else(|| format!("bad shout ownership {text:?}"))?;
    let specialist = owners
        .next()
        .ok_or_else(|| format!("bad shout ownership {text:?}"))?;

    let mut shout = Shout::new(
        ShoutId::from(id),
        price,
        quantity,
        is_bid,
        TraderId::from(trader),
        SpecialistId::from(specialist),
    );
    shout.state = state;
    Ok(shout)
}

fn parse_posted_transaction(msg: &Message) -> Result<Transaction, String> {
    let id = msg
        .header(Header::Id)
        .ok_or_else(|| "missing ID header".to_string())?;
    let value = msg
        .header(Header::Value)
        .ok_or_else(|| "missing VALUE header".to_string())?;
    let specialist = msg
        .header(Header::Text)
        .ok_or_else(|| "missing TEXT header".to_string())?;

    let mut parts = value.split_whitespace();
    let ask = parts
        .next()
        .ok_or_else(|| format!("bad transaction value {value:?}"))?;
    let bid = parts
        .next()
        .ok_or_else(|| format!("bad transaction value {value:?}"))?;
    let price: f64 = parts
        .next()
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| format!("bad transaction value {value:?}"))?;
    let quantity: u32 = match parts.next() {
        None => 1,
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("bad transaction value {value:?}"))?,
    };

    Ok(Transaction {
        id: TransactionId::from(id),
        ask: ShoutId::from(ask),
        bid: ShoutId::from(bid),
        price,
        quantity,
        specialist: SpecialistId::from(specialist),
    })
}

fn parse_popularity(msg: &Message) -> Result<Vec<(SpecialistId, f64)>, String> {
    let ids: Vec<&str> = msg
        .header(Header::Id)
        .map(|raw| raw.split_whitespace().collect())
        .unwrap_or_default();
    let values: Vec<&str> = msg
        .header(Header::Value)
        .map(|raw| raw.split_whitespace().collect())
        .unwrap_or_default();
    if ids.len() != values.len() {
        return Err(format!(
            "popularity lists disagree: {} ids, {} values",
            ids.len(),
            values.len()
        ));
    }
    ids.into_iter()
        .zip(values)
        .map(|(id, raw)| {
            raw.parse::<f64>()
                .map(|count| (SpecialistId::from(id), count))
                .map_err(|_| format!("bad popularity value {raw:?}"))
        })
        .collect()
}
