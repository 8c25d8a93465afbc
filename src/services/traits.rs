use std::rc::Rc;

use crate::event::Dispatcher;
use crate::sync::Session;

/// A service living on the link.
///
/// Services own no connection state. They register event handlers once,
/// the first time the uplink comes up, and from then on act through the
/// [`Session`] those handlers are given.
pub trait Service {
    /// Canonical name, for logs.
    fn name(&self) -> &'static str;

    /// Hook this service's handlers into the dispatcher. Handlers that must
    /// outlive a reconnect are registered persistent.
    fn register(self: Rc<Self>, dispatcher: &mut Dispatcher<Session>);
}
