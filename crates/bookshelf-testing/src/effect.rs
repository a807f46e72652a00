//! Effect that records every command it is handed.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bookshelf::{Effect, ShelfCommand};

use crate::lock;

#[derive(Debug, Clone, Default)]
pub struct RecordingEffect {
    commands: Arc<Mutex<Vec<ShelfCommand>>>,
}

impl RecordingEffect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<ShelfCommand> {
        lock(&self.commands).clone()
    }

    /// Drain what was recorded so far.
    pub fn take(&self) -> Vec<ShelfCommand> {
        std::mem::take(&mut *lock(&self.commands))
    }

    pub fn contains(&self, cmd: &ShelfCommand) -> bool {
        lock(&self.commands).contains(cmd)
    }
}

#[async_trait]
impl Effect for RecordingEffect {
    async fn execute(&self, cmd: ShelfCommand) -> anyhow::Result<()> {
        lock(&self.commands).push(cmd);
        Ok(())
    }
}
