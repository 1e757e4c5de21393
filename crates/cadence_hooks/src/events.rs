//! Scheduler events.
//!
//! Every tick produces a stream of [`SchedulerEvent`]s on the channel returned
//! by [`HookScheduler::take_events`](crate::HookScheduler::take_events). This
//! is the only place background failures surface.
//!
//! # Example
//!
//! ```ignore
//! let mut events = scheduler.take_events();
//! while let Ok(event) = events.try_recv() {
//!     if let SchedulerEvent::BackgroundFailed { hook_name, error, .. } = event {
//!         eprintln!("{hook_name} failed: {error}");
//!     }
//! }
//! ```

use core::fmt;
use core::time::Duration;

use crate::resolver::HookId;
use crate::time_step::TickCounters;

/// Execution channel of a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// On the operator thread against the live registry.
    Inline,
    /// On a worker against a registry snapshot.
    Background,
}

impl Channel {
    /// Channel of a hook given its background flag.
    #[must_use]
    pub fn of(background: bool) -> Self {
        if background {
            Channel::Background
        } else {
            Channel::Inline
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Inline => f.write_str("inline"),
            Channel::Background => f.write_str("background"),
        }
    }
}

/// Per-tick state of one resolved hook.
///
/// `Pending -> DueCheck -> {Skipped | Queued} -> {InlineExecuting |
/// BackgroundDispatched} -> {Completed | Failed}`, with commands moving on to
/// `Consumed` after completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    /// Not yet looked at this tick.
    Pending,
    /// Being checked against the tick counters.
    DueCheck,
    /// Not due this tick (or out of lives, or an already consumed command).
    Skipped,
    /// Due and waiting for its channel.
    Queued,
    /// Running on the operator thread.
    InlineExecuting,
    /// Handed to a background worker.
    BackgroundDispatched,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// A command that completed its single invocation.
    Consumed,
}

/// Event emitted by the scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    // ─────────────────────────────────────────────────────────────────────────
    // Resolution
    // ─────────────────────────────────────────────────────────────────────────
    /// The hook graph was (re)resolved.
    Resolved {
        /// Number of hooks in the execution order.
        hook_count: usize,
        /// Number of hooks merged into an equivalent one.
        collapsed: usize,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Tick
    // ─────────────────────────────────────────────────────────────────────────
    /// A tick started.
    TickStart {
        /// Counters of the tick.
        counters: TickCounters,
        /// Number of hooks due this tick.
        due: usize,
    },

    /// All inline hooks finished and background hooks were dispatched.
    TickComplete {
        /// Counters of the tick.
        counters: TickCounters,
        /// Number of inline hooks executed.
        inline: usize,
        /// Number of background hooks dispatched.
        background: usize,
        /// Time spent in the tick (excluding background work).
        duration: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Hook
    // ─────────────────────────────────────────────────────────────────────────
    /// A hook moved into an executing phase.
    HookStart {
        /// Resolved id of the hook.
        hook_id: HookId,
        /// The hook's name.
        hook_name: String,
        /// [`HookPhase::InlineExecuting`] or [`HookPhase::BackgroundDispatched`].
        phase: HookPhase,
    },

    /// A hook finished successfully.
    HookComplete {
        /// Resolved id of the hook.
        hook_id: HookId,
        /// The hook's name.
        hook_name: String,
        /// Channel it ran on.
        channel: Channel,
        /// How long the invocation took.
        duration: Duration,
    },

    /// An inline hook failed; the tick was aborted.
    HookFailed {
        /// Resolved id of the hook.
        hook_id: HookId,
        /// The hook's name.
        hook_name: String,
        /// The error message.
        error: String,
    },

    /// A background hook failed, panicked or could not get its snapshot.
    BackgroundFailed {
        /// Resolved id of the hook.
        hook_id: HookId,
        /// The hook's name.
        hook_name: String,
        /// The error message.
        error: String,
    },

    /// A command completed its single invocation and its `on_finish` ran.
    CommandFinished {
        /// Resolved id of the command.
        hook_id: HookId,
        /// The command's name.
        hook_name: String,
        /// Channel it ran on.
        channel: Channel,
    },
}

impl SchedulerEvent {
    /// Name of the hook the event is about, if any.
    #[must_use]
    pub fn hook_name(&self) -> Option<&str> {
        match self {
            SchedulerEvent::Resolved { .. }
            | SchedulerEvent::TickStart { .. }
            | SchedulerEvent::TickComplete { .. } => None,
            SchedulerEvent::HookStart { hook_name, .. }
            | SchedulerEvent::HookComplete { hook_name, .. }
            | SchedulerEvent::HookFailed { hook_name, .. }
            | SchedulerEvent::BackgroundFailed { hook_name, .. }
            | SchedulerEvent::CommandFinished { hook_name, .. } => Some(hook_name),
        }
    }

    /// Returns `true` for [`HookFailed`](Self::HookFailed) and
    /// [`BackgroundFailed`](Self::BackgroundFailed).
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SchedulerEvent::HookFailed { .. } | SchedulerEvent::BackgroundFailed { .. }
        )
    }
}
