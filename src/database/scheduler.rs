use std::collections::VecDeque;

/// In-memory review queue for the selected deck.
///
/// The queue is built lazily from the store on the first `next_card` and handed out
/// one card at a time; `reset` throws it away so the next call rebuilds it.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: Option<VecDeque<i64>>,
}

impl Scheduler {
    pub fn is_built(&self) -> bool {
        self.queue.is_some()
    }

    pub fn rebuild(&mut self, card_ids: Vec<i64>) {
        self.queue = Some(card_ids.into());
    }

    pub fn pop(&mut self) -> Option<i64> {
        self.queue.as_mut().and_then(VecDeque::pop_front)
    }

    pub fn reset(&mut self) {
        self.queue = None;
    }
}
