//! A complete in-process game: one market, one trader, and a scripted
//! game controller, wired over the channel transport.
//!
//! The controller plays the server's side of the protocol: it accepts
//! both check-ins, holds the first day behind the start barrier, walks
//! one day of one round, routes the trader's bid to the market, records
//! the trade the market proposes, and closes the game.
//!
//! Run with `cargo run -p double-auction` (set `RUST_LOG=debug` for the
//! full message flow).

use std::sync::Arc;

use catwire::prelude::*;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Demo collaborators
// ---------------------------------------------------------------------------

/// One-level book: the newest bid crosses the standing ask at the
/// midpoint.
#[derive(Default)]
struct MidpointBook {
    best_ask: Option<(ShoutId, f64)>,
    best_bid: Option<(ShoutId, f64)>,
}

impl Auctioneer for MidpointBook {
    fn new_shout(&mut self, shout: &Shout) -> Vec<TradeProposal> {
        if shout.is_bid {
            self.best_bid = Some((shout.id.clone(), shout.price));
        } else {
            self.best_ask = Some((shout.id.clone(), shout.price));
        }
        if let (Some((ask, ask_price)), Some((bid, bid_price))) =
            (&self.best_ask, &self.best_bid)
        {
            if bid_price >= ask_price {
                let proposal = TradeProposal {
                    ask: ask.clone(),
                    bid: bid.clone(),
                    price: (ask_price + bid_price) / 2.0,
                    quantity: 1,
                };
                self.best_ask = None;
                self.best_bid = None;
                return vec![proposal];
            }
        }
        Vec::new()
    }

    fn remove_shout(&mut self, shout: &ShoutId) {
        if self.best_ask.as_ref().is_some_and(|(id, _)| id == shout) {
            self.best_ask = None;
        }
        if self.best_bid.as_ref().is_some_and(|(id, _)| id == shout) {
            self.best_bid = None;
        }
    }
}

/// Logs every event under the client's name and forwards a copy, so the
/// trader's strategy task can react to lifecycle changes.
struct EventTap {
    name: &'static str,
    forward: Option<mpsc::UnboundedSender<AuctionEvent>>,
}

impl EventListener for EventTap {
    fn on_event(&mut self, event: &AuctionEvent) -> Result<(), ListenerError> {
        tracing::info!(client = self.name, ?event, "event");
        if let Some(tx) = &self.forward {
            let _ = tx.send(event.clone());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// The scripted game controller
// ---------------------------------------------------------------------------

async fn recv(conn: &mut ChannelConnection) -> Message {
    conn.recv()
        .await
        .expect("demo transport stays healthy")
        .expect("demo peer stays open")
}

async fn expect_ok(conn: &mut ChannelConnection) {
    let reply = recv(conn).await;
    assert_eq!(reply.status(), Some(Status::Ok), "client refused {reply}");
}

/// Sends one lifecycle announcement to both clients and collects the OKs.
async fn announce(
    market: &mut ChannelConnection,
    trader: &mut ChannelConnection,
    stage: Lifecycle,
    build: impl Fn(Message) -> Message,
) {
    let msg = build(Message::request(Verb::Options).with_header(Header::Type, stage.as_wire()));
    market.send(&msg).await.unwrap();
    expect_ok(market).await;
    trader.send(&msg).await.unwrap();
    expect_ok(trader).await;
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let barrier = Arc::new(StartBarrier::new(2));

    // Wire both clients straight to the controller.
    let (market_end, mut market_srv) = channel_pair();
    let (trader_end, mut trader_srv) = channel_pair();

    let mut market = MarketClient::new(
        ChannelConnector::new(market_end),
        ClientConfig {
            proposed_id: Some("m-demo".into()),
            ..ClientConfig::for_role(Role::Specialist)
        },
        Box::new(MidpointBook::default()),
    );
    market.add_listener(Box::new(EventTap {
        name: "market",
        forward: None,
    }));
    market.attach_barrier(Arc::clone(&barrier));

    let (mut trader, handle) = TraderClient::new(
        ChannelConnector::new(trader_end),
        ClientConfig {
            proposed_id: Some("t-demo".into()),
            ..ClientConfig::for_role(Role::Trader)
        },
    );
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    trader.add_listener(Box::new(EventTap {
        name: "trader",
        forward: Some(events_tx),
    }));
    trader.attach_barrier(Arc::clone(&barrier));

    let market_task = tokio::spawn(async move {
        let result = market.run().await;
        (market, result)
    });
    let trader_task = tokio::spawn(async move {
        let result = trader.run().await;
        (trader, result)
    });

    // The trader's strategy: register when the day opens, bid when the
    // round opens.
    let strategy = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                AuctionEvent::DayOpened { .. } => {
                    handle
                        .register(SpecialistId::from("m-demo"))
                        .await
                        .expect("registration should be accepted");
                }
                AuctionEvent::RoundOpened { .. } => {
                    handle.bid(9.5, 1).await.expect("bid should be accepted");
                }
                AuctionEvent::GameOver => break,
                _ => {}
            }
        }
    });

    // -- Check-in and the start barrier -----------------------------------

    for conn in [&mut market_srv, &mut trader_srv] {
        let checkin = recv(conn).await;
        assert_eq!(checkin.verb(), Some(Verb::CheckIn));
        let id = checkin.header(Header::Id).expect("demo clients propose ids");
        let ok = Message::response(Status::Ok).with_header(Header::Id, id);
        conn.send(&ok).await.unwrap();
    }

    match barrier.sync().await {
        Ok(()) => tracing::info!("both clients started; opening the game"),
        Err(e) => tracing::warn!(error = %e, "opening without full population"),
    }

    // -- One game, one day, one round --------------------------------------

    announce(&mut market_srv, &mut trader_srv, Lifecycle::GameStarting, |m| m).await;

    // Introduce the population to both clients.
    for conn in [&mut market_srv, &mut trader_srv] {
        for msg in [
            Message::request(Verb::Post)
                .with_header(Header::Type, PostType::Trader.as_wire())
                .with_header(Header::Id, "t-demo")
                .with_header(Header::Value, "0"),
            Message::request(Verb::Post)
                .with_header(Header::Type, PostType::Trader.as_wire())
                .with_header(Header::Id, "t-ghost")
                .with_header(Header::Value, "1"),
            Message::request(Verb::Post)
                .with_header(Header::Type, PostType::Specialist.as_wire())
                .with_header(Header::Id, "m-demo"),
        ] {
            conn.send(&msg).await.unwrap();
            expect_ok(conn).await;
        }
    }

    announce(&mut market_srv, &mut trader_srv, Lifecycle::GameStarted, |m| m).await;
    announce(&mut market_srv, &mut trader_srv, Lifecycle::DayOpening, |m| {
        m.with_header(Header::Time, "1").with_tag("1.0")
    })
    .await;
    announce(&mut market_srv, &mut trader_srv, Lifecycle::DayOpened, |m| {
        m.with_header(Header::Value, "12.0")
    })
    .await;

    // The trader registers; the market is told.
    let register = recv(&mut trader_srv).await;
    assert_eq!(register.verb(), Some(Verb::Register));
    trader_srv.send(&Message::response(Status::Ok)).await.unwrap();
    market_srv
        .send(&Message::request(Verb::Register).with_header(Header::Id, "t-demo"))
        .await
        .unwrap();
    expect_ok(&mut market_srv).await;

    announce(&mut market_srv, &mut trader_srv, Lifecycle::RoundOpened, |m| {
        m.with_header(Header::Time, "1").with_tag("1.1")
    })
    .await;

    // A resting ask from elsewhere in the game.
    market_srv
        .send(
            &Message::request(Verb::Post)
                .with_header(Header::Type, PostType::Ask.as_wire())
                .with_header(Header::Id, "a1")
                .with_header(Header::Value, "9 1")
                .with_header(Header::Text, "t-ghost m-demo"),
        )
        .await
        .unwrap();
    expect_ok(&mut market_srv).await;

    // The trader's bid arrives, is accepted, and crosses at the market.
    let bid = recv(&mut trader_srv).await;
    assert_eq!(bid.verb(), Some(Verb::Bid));
    trader_srv
        .send(&Message::response(Status::Ok).with_header(Header::Id, "b1"))
        .await
        .unwrap();
    market_srv
        .send(
            &Message::request(Verb::Post)
                .with_header(Header::Type, PostType::Bid.as_wire())
                .with_header(Header::Id, "b1")
                .with_header(Header::Value, "9.5 1")
                .with_header(Header::Text, "t-demo m-demo"),
        )
        .await
        .unwrap();
    expect_ok(&mut market_srv).await;

    let transaction = recv(&mut market_srv).await;
    assert_eq!(transaction.verb(), Some(Verb::Transaction));
    tracing::info!(%transaction, "market requested a trade");
    market_srv.send(&Message::response(Status::Ok)).await.unwrap();

    // Settle: matched echoes, then the recorded trade, to both clients.
    for conn in [&mut market_srv, &mut trader_srv] {
        for msg in [
            Message::request(Verb::Post)
                .with_header(Header::Type, PostType::Ask.as_wire())
                .with_header(Header::Id, "a1")
                .with_header(Header::Value, "9.25 1 Matched")
                .with_header(Header::Text, "t-ghost m-demo"),
            Message::request(Verb::Post)
                .with_header(Header::Type, PostType::Bid.as_wire())
                .with_header(Header::Id, "b1")
                .with_header(Header::Value, "9.25 1 Matched")
                .with_header(Header::Text, "t-demo m-demo"),
            Message::request(Verb::Post)
                .with_header(Header::Type, PostType::Transaction.as_wire())
                .with_header(Header::Id, "x1")
                .with_header(Header::Value, "a1 b1 9.25 1")
                .with_header(Header::Text, "m-demo"),
        ] {
            conn.send(&msg).await.unwrap();
            expect_ok(conn).await;
        }
    }

    announce(&mut market_srv, &mut trader_srv, Lifecycle::RoundClosing, |m| m).await;
    announce(&mut market_srv, &mut trader_srv, Lifecycle::RoundClosed, |m| m).await;
    announce(&mut market_srv, &mut trader_srv, Lifecycle::DayClosed, |m| {
        m.with_header(Header::Id, "m-demo").with_header(Header::Value, "1")
    })
    .await;
    announce(&mut market_srv, &mut trader_srv, Lifecycle::GameOver, |m| m).await;

    // Hang up; the run loops end cleanly.
    drop(market_srv);
    drop(trader_srv);

    let (market, market_result) = market_task.await.unwrap();
    let (trader, trader_result) = trader_task.await.unwrap();
    market_result.expect("market run should end cleanly");
    trader_result.expect("trader run should end cleanly");
    strategy.await.unwrap();

    tracing::info!(
        market_transactions = market.registry().core.transaction_count(),
        market_inconsistencies = market.registry().core.counters().total(),
        trader_transactions = trader.registry().core.transaction_count(),
        "game complete"
    );
}
