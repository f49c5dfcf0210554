use tokio::sync::broadcast::{self, Receiver, Sender};

use crate::manager::events::Event;


const BUFFER_SIZE: usize = 50;
pub fn event_channel() -> (Sender<Event>, Receiver<Event>) {
    broadcast::channel(BUFFER_SIZE)
}
