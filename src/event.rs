//! Events, the event queue and the dispatcher.
//!
//! Everything interesting that happens on the link (a decoded command, a
//! model mutation, the burst starting or ending) is posted to the
//! [`EventQueue`] as an [`Event`]. The [`Dispatcher`] drains the queue in
//! post order and hands each event to the handlers registered under its
//! name. Handlers may post further events; those are drained in the same
//! pass. `exit` handlers run only once nothing else is queued.

use std::borrow::Cow;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tracing::trace;

use crate::state::{ChannelMode, UserMode};

/// Something that happened on the link.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connected { address: String },
    Disconnected { reason: String },
    StartOfBurst,
    EndOfBurst { elapsed: Duration },
    ServerAdded { name: String },
    ServerDeleted { name: String },
    UserAdded { key: String },
    UserDeleted { key: String, nick: String, reason: String },
    NicknameChanged { key: String, old: String, new: String },
    UserJoinedChannel { key: String, channel: String },
    UserPartedChannel { key: String, channel: String },
    ChannelAdded { name: String },
    ChannelDeleted { name: String },
    ModeAddedOnChannel { mode: ChannelMode, param: Option<String>, channel: String },
    ModeDeletedOnChannel { mode: ChannelMode, param: Option<String>, channel: String },
    ModeAddedOnUser { mode: UserMode, key: String },
    ModeDeletedOnUser { mode: UserMode, key: String },
    TopicChanged { channel: String, topic: String, setter: String },
    AccountChanged { key: String, account: Option<String> },
    /// Posted by a [`TimerAction::Post`](crate::timer::TimerAction::Post) timer.
    TimerFired { name: String },
    /// A decoded command, after the dialect has handled it. Named
    /// `irc_<command>` with the full (untokenized) command name.
    Command(CommandEvent),
    Exit { reason: String },
}

/// Payload of [`Event::Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    /// Full uppercase command name (`PRIVMSG`, `BURST`, ...).
    pub command: String,
    /// Origin as it appeared on the wire, if any.
    pub origin: Option<String>,
    pub params: Vec<String>,
}

impl Event {
    /// The name handlers register under.
    pub fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(match self {
            Self::Connected { .. } => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::StartOfBurst => "start_of_burst",
            Self::EndOfBurst { .. } => "end_of_burst",
            Self::ServerAdded { .. } => "server_added",
            Self::ServerDeleted { .. } => "server_deleted",
            Self::UserAdded { .. } => "user_added",
            Self::UserDeleted { .. } => "user_deleted",
            Self::NicknameChanged { .. } => "nickname_changed",
            Self::UserJoinedChannel { .. } => "user_joined_channel",
            Self::UserPartedChannel { .. } => "user_parted_channel",
            Self::ChannelAdded { .. } => "channel_added",
            Self::ChannelDeleted { .. } => "channel_deleted",
            Self::ModeAddedOnChannel { .. } => "mode_added_on_channel",
            Self::ModeDeletedOnChannel { .. } => "mode_deleted_on_channel",
            Self::ModeAddedOnUser { .. } => "mode_added_on_user",
            Self::ModeDeletedOnUser { .. } => "mode_deleted_on_user",
            Self::TopicChanged { .. } => "topic_changed",
            Self::AccountChanged { .. } => "account_changed",
            Self::TimerFired { .. } => "timer_fired",
            Self::Exit { .. } => "exit",
            Self::Command(cmd) => return Cow::Owned(command_event_name(&cmd.command)),
        })
    }
}

/// `PRIVMSG` → `irc_privmsg`.
pub fn command_event_name(command: &str) -> String {
    format!("irc_{}", command.to_ascii_lowercase())
}

/// FIFO of posted events.
#[derive(Debug, Default)]
pub struct EventQueue {
    queue: VecDeque<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&mut self, event: Event) {
        trace!(event = %event.name(), "Posted");
        self.queue.push_back(event);
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.queue.iter()
    }
}

/// Anything the dispatcher can drain: it owns an [`EventQueue`] and is what
/// handlers get to act on.
pub trait EventContext {
    fn event_queue(&mut self) -> &mut EventQueue;
}

/// A registered event handler.
pub type Handler<C> = Box<dyn FnMut(&mut C, &Event)>;

struct Registration<C> {
    handler: Handler<C>,
    persistent: bool,
}

/// Routes drained events to handlers by name.
pub struct Dispatcher<C> {
    handlers: HashMap<String, Vec<Registration<C>>>,
}

impl<C: EventContext> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: EventContext> Dispatcher<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler that [`clear_handlers`](Self::clear_handlers)
    /// removes.
    pub fn handle<F>(&mut self, event: impl Into<String>, handler: F)
    where
        F: FnMut(&mut C, &Event) + 'static,
    {
        self.register(event.into(), Box::new(handler), false);
    }

    /// Register a handler that survives `clear_handlers`.
    pub fn handle_persistent<F>(&mut self, event: impl Into<String>, handler: F)
    where
        F: FnMut(&mut C, &Event) + 'static,
    {
        self.register(event.into(), Box::new(handler), true);
    }

    fn register(&mut self, event: String, handler: Handler<C>, persistent: bool) {
        self.handlers
            .entry(event)
            .or_default()
            .push(Registration {
                handler,
                persistent,
            });
    }

    /// Drop every non-persistent handler.
    pub fn clear_handlers(&mut self) {
        for regs in self.handlers.values_mut() {
            regs.retain(|r| r.persistent);
        }
        self.handlers.retain(|_, regs| !regs.is_empty());
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, Vec::len)
    }

    /// Drain the context's queue. Returns how many events were dispatched.
    pub fn drain(&mut self, ctx: &mut C) -> usize {
        let mut dispatched = 0;
        let mut exits = Vec::new();

        loop {
            while let Some(event) = ctx.event_queue().pop() {
                if matches!(event, Event::Exit { .. }) {
                    exits.push(event);
                    continue;
                }
                self.dispatch(ctx, &event);
                dispatched += 1;
            }

            if exits.is_empty() {
                break;
            }
            for event in std::mem::take(&mut exits) {
                self.dispatch(ctx, &event);
                dispatched += 1;
            }
        }

        dispatched
    }

    fn dispatch(&mut self, ctx: &mut C, event: &Event) {
        let name = event.name();
        if let Some(regs) = self.handlers.get_mut(name.as_ref()) {
            for reg in regs.iter_mut() {
                (reg.handler)(ctx, event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Ctx {
        events: EventQueue,
    }

    impl EventContext for Ctx {
        fn event_queue(&mut self) -> &mut EventQueue {
            &mut self.events
        }
    }

    fn recorder(log: &Rc<RefCell<Vec<String>>>) -> impl FnMut(&mut Ctx, &Event) + 'static {
        let log = Rc::clone(log);
        move |_, ev| log.borrow_mut().push(ev.name().into_owned())
    }

    #[test]
    fn names_commands_in_lowercase() {
        let ev = Event::Command(CommandEvent {
            command: "PRIVMSG".into(),
            origin: None,
            params: vec![],
        });
        assert_eq!(ev.name(), "irc_privmsg");
        assert_eq!(Event::StartOfBurst.name(), "start_of_burst");
    }

    #[test]
    fn drains_in_post_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.handle("start_of_burst", recorder(&log));
        dispatcher.handle("channel_added", recorder(&log));
        dispatcher.handle("end_of_burst", recorder(&log));

        let mut ctx = Ctx::default();
        ctx.events.post(Event::StartOfBurst);
        ctx.events.post(Event::ChannelAdded { name: "#a".into() });
        ctx.events.post(Event::EndOfBurst {
            elapsed: Duration::ZERO,
        });

        assert_eq!(dispatcher.drain(&mut ctx), 3);
        assert_eq!(
            *log.borrow(),
            vec!["start_of_burst", "channel_added", "end_of_burst"]
        );
        assert!(ctx.events.is_empty());
    }

    #[test]
    fn handler_posts_are_drained_in_same_pass() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.handle("start_of_burst", |ctx: &mut Ctx, _| {
            ctx.events.post(Event::ChannelAdded { name: "#a".into() });
        });
        dispatcher.handle("channel_added", recorder(&log));

        let mut ctx = Ctx::default();
        ctx.events.post(Event::StartOfBurst);
        dispatcher.drain(&mut ctx);
        assert_eq!(*log.borrow(), vec!["channel_added"]);
    }

    #[test]
    fn exit_runs_after_everything_else() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.handle("exit", recorder(&log));
        dispatcher.handle("server_added", recorder(&log));
        dispatcher.handle("server_added", |ctx: &mut Ctx, ev| {
            if let Event::ServerAdded { name } = ev
                && name == "a"
            {
                ctx.events.post(Event::ServerAdded { name: "b".into() });
            }
        });

        let mut ctx = Ctx::default();
        ctx.events.post(Event::Exit {
            reason: "shutdown".into(),
        });
        ctx.events.post(Event::ServerAdded { name: "a".into() });
        dispatcher.drain(&mut ctx);

        assert_eq!(*log.borrow(), vec!["server_added", "server_added", "exit"]);
    }

    #[test]
    fn clear_keeps_persistent_handlers() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.handle("start_of_burst", recorder(&log));
        dispatcher.handle_persistent("start_of_burst", recorder(&log));
        dispatcher.handle("end_of_burst", recorder(&log));

        dispatcher.clear_handlers();
        assert_eq!(dispatcher.handler_count("start_of_burst"), 1);
        assert_eq!(dispatcher.handler_count("end_of_burst"), 0);

        let mut ctx = Ctx::default();
        ctx.events.post(Event::StartOfBurst);
        dispatcher.drain(&mut ctx);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn unhandled_events_are_consumed() {
        let mut dispatcher: Dispatcher<Ctx> = Dispatcher::new();
        let mut ctx = Ctx::default();
        ctx.events.post(Event::StartOfBurst);
        assert_eq!(dispatcher.drain(&mut ctx), 1);
        assert!(ctx.events.is_empty());
    }
}
