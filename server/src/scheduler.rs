//! Paces the draws of a round.
//!
//! The scheduler never touches session state on its own. Its timers are
//! small tokio tasks that sleep and then post a `ServerMessage::Timer` back
//! to the session loop, so a draw is processed in the same queue as claims
//! and can never interleave with one.
//!
//! Every armed timer carries a generation number. Cancelling bumps the
//! generation, which makes a tick that was already queued before the
//! cancel harmless.

use crate::network::ServerMessage;
use crate::number_pool::NumberPool;
use crate::replication::ReplicationChannel;
use log::{debug, warn};
use rand::Rng;
use shared::Packet;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// The settle delay after a start request has elapsed.
    Settled,
    /// The next number is due.
    DrawDue,
}

/// Whether the round keeps drawing after a scheduler step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawStep {
    Continue,
    Finished,
}

pub struct DrawScheduler {
    interval: Duration,
    settle_delay: Duration,
    timer_tx: mpsc::UnboundedSender<ServerMessage>,
    generation: u64,
    pending: Option<JoinHandle<()>>,
    deadline: Option<Instant>,
}

impl DrawScheduler {
    pub fn new(
        interval: Duration,
        settle_delay: Duration,
        timer_tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            interval,
            settle_delay,
            timer_tx,
            generation: 0,
            pending: None,
            deadline: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Time left until the armed timer fires, if any.
    pub fn time_remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Arms the settle timer that moves a starting session into drawing.
    pub fn begin_settle(&mut self) {
        self.arm(self.settle_delay, TimerEvent::Settled);
    }

    /// Announces the first countdown of a round and arms the first draw.
    pub fn begin_drawing(
        &mut self,
        pool: &NumberPool,
        max_draws: usize,
        replication: &ReplicationChannel,
    ) -> DrawStep {
        if !pool.can_draw(max_draws) {
            warn!("Round started with nothing to draw");
            replication.broadcast(&countdown(Duration::ZERO));
            return DrawStep::Finished;
        }

        replication.broadcast(&countdown(self.interval));
        self.arm(self.interval, TimerEvent::DrawDue);
        DrawStep::Continue
    }

    /// Performs a due draw and either re-arms or finishes the round.
    ///
    /// The drawn value and the next countdown go out back to back, so every
    /// client re-anchors its local timer on each draw.
    pub fn on_draw_due<R: Rng + ?Sized>(
        &mut self,
        pool: &mut NumberPool,
        rng: &mut R,
        max_draws: usize,
        replication: &ReplicationChannel,
    ) -> DrawStep {
        let ordinal = pool.drawn().len() as u32;
        match pool.draw_next(rng) {
            Ok(value) => {
                debug!("Drew {} ({} drawn)", value, pool.drawn().len());
                replication.broadcast(&Packet::NumberDrawn { ordinal, value });
            }
            Err(e) => warn!("Draw failed: {}", e),
        }

        if pool.can_draw(max_draws) {
            replication.broadcast(&countdown(self.interval));
            self.arm(self.interval, TimerEvent::DrawDue);
            DrawStep::Continue
        } else {
            replication.broadcast(&countdown(Duration::ZERO));
            DrawStep::Finished
        }
    }

    /// Consumes a timer message. Returns true only for the currently armed
    /// timer; stale generations are ignored.
    pub fn fired(&mut self, generation: u64) -> bool {
        if self.pending.is_none() || generation != self.generation {
            debug!(
                "Ignoring stale timer generation {} (current {})",
                generation, self.generation
            );
            return false;
        }

        self.pending = None;
        self.deadline = None;
        true
    }

    /// Aborts any pending wait.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        self.deadline = None;
        self.generation += 1;
    }

    fn arm(&mut self, delay: Duration, event: TimerEvent) {
        self.cancel();

        let generation = self.generation;
        let timer_tx = self.timer_tx.clone();
        self.deadline = Some(Instant::now() + delay);
        self.pending = Some(tokio::spawn(async move {
            sleep(delay).await;
            let _ = timer_tx.send(ServerMessage::Timer { generation, event });
        }));
    }
}

impl Drop for DrawScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

fn countdown(until_next: Duration) -> Packet {
    Packet::CountdownReset {
        seconds_until_next_draw: until_next.as_secs_f32(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::Outgoing;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::net::SocketAddr;

    struct Fixture {
        scheduler: DrawScheduler,
        replication: ReplicationChannel,
        timer_rx: mpsc::UnboundedReceiver<ServerMessage>,
        outbound_rx: mpsc::UnboundedReceiver<Outgoing>,
    }

    fn fixture(interval_ms: u64) -> Fixture {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let mut replication = ReplicationChannel::new(outbound_tx);
        replication.subscribe(1, SocketAddr::from(([127, 0, 0, 1], 9000)));

        Fixture {
            scheduler: DrawScheduler::new(
                Duration::from_millis(interval_ms),
                Duration::from_millis(interval_ms),
                timer_tx,
            ),
            replication,
            timer_rx,
            outbound_rx,
        }
    }

    fn sent(rx: &mut mpsc::UnboundedReceiver<Outgoing>) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Ok(out) = rx.try_recv() {
            packets.push(out.packet);
        }
        packets
    }

    #[tokio::test]
    async fn test_timer_posts_current_generation() {
        let mut f = fixture(5);
        let pool = NumberPool::new(1, 10);

        assert_eq!(
            f.scheduler.begin_drawing(&pool, 10, &f.replication),
            DrawStep::Continue
        );
        assert!(f.scheduler.is_armed());

        let message = f.timer_rx.recv().await.unwrap();
        match message {
            ServerMessage::Timer { generation, event } => {
                assert_eq!(event, TimerEvent::DrawDue);
                assert!(f.scheduler.fired(generation));
                assert!(!f.scheduler.is_armed());
            }
            _ => panic!("Unexpected message type"),
        }

        match sent(&mut f.outbound_rx).as_slice() {
            [Packet::CountdownReset {
                seconds_until_next_draw,
            }] => assert_approx_eq!(*seconds_until_next_draw, 0.005, 0.0001),
            other => panic!("Unexpected packets {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_makes_queued_tick_stale() {
        let mut f = fixture(1);
        let pool = NumberPool::new(1, 10);
        f.scheduler.begin_drawing(&pool, 10, &f.replication);

        let message = f.timer_rx.recv().await.unwrap();
        f.scheduler.cancel();

        match message {
            ServerMessage::Timer { generation, .. } => assert!(!f.scheduler.fired(generation)),
            _ => panic!("Unexpected message type"),
        }
        assert!(f.scheduler.time_remaining().is_none());
    }

    #[tokio::test]
    async fn test_exhaustion_stops_without_extra_draw() {
        let mut f = fixture(1000);
        let mut rng = StdRng::seed_from_u64(11);
        let mut pool = NumberPool::new(1, 5);

        f.scheduler.begin_drawing(&pool, 10, &f.replication);
        let mut steps = Vec::new();
        for _ in 0..5 {
            steps.push(f.scheduler.on_draw_due(&mut pool, &mut rng, 10, &f.replication));
        }

        assert_eq!(&steps[..4], &[DrawStep::Continue; 4]);
        assert_eq!(steps[4], DrawStep::Finished);
        assert!(pool.is_exhausted());
        assert!(!f.scheduler.is_armed());

        let packets = sent(&mut f.outbound_rx);
        let ordinals: Vec<u32> = packets
            .iter()
            .filter_map(|p| match p {
                Packet::NumberDrawn { ordinal, .. } => Some(*ordinal),
                _ => None,
            })
            .collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3, 4]);
        assert_eq!(
            packets.last(),
            Some(&Packet::CountdownReset {
                seconds_until_next_draw: 0.0
            })
        );
    }

    #[tokio::test]
    async fn test_countdown_follows_every_draw() {
        let mut f = fixture(1000);
        let mut rng = StdRng::seed_from_u64(12);
        let mut pool = NumberPool::new(1, 75);

        f.scheduler.begin_drawing(&pool, 3, &f.replication);
        f.scheduler.on_draw_due(&mut pool, &mut rng, 3, &f.replication);

        let packets = sent(&mut f.outbound_rx);
        assert_eq!(packets.len(), 3);
        assert!(matches!(packets[0], Packet::CountdownReset { .. }));
        assert!(matches!(packets[1], Packet::NumberDrawn { .. }));
        assert_eq!(
            packets[2],
            Packet::CountdownReset {
                seconds_until_next_draw: 1.0
            }
        );
        f.scheduler.cancel();
    }

    #[tokio::test]
    async fn test_max_draws_limit_finishes_round() {
        let mut f = fixture(1000);
        let mut rng = StdRng::seed_from_u64(13);
        let mut pool = NumberPool::new(1, 75);

        f.scheduler.begin_drawing(&pool, 2, &f.replication);
        assert_eq!(
            f.scheduler.on_draw_due(&mut pool, &mut rng, 2, &f.replication),
            DrawStep::Continue
        );
        assert_eq!(
            f.scheduler.on_draw_due(&mut pool, &mut rng, 2, &f.replication),
            DrawStep::Finished
        );
        assert_eq!(pool.drawn().len(), 2);
    }

    #[tokio::test]
    async fn test_nothing_to_draw_finishes_immediately() {
        let mut f = fixture(1000);
        let pool = NumberPool::new(1, 5);

        assert_eq!(
            f.scheduler.begin_drawing(&pool, 0, &f.replication),
            DrawStep::Finished
        );
        assert!(!f.scheduler.is_armed());
    }
}
