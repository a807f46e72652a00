//! Async driver around [`ShelfController`].
//!
//! The controller is synchronous and owns all session state. The engine
//! gives it a single-consumer event queue so notifications are handled one
//! at a time, and hands every command it decides to the registered effects
//! in order.
//!
//! ```text
//! EngineHandle::emit() ──► mpsc ──► Engine::run()
//!                                      │
//!                                      ├─► controller.handle(event)
//!                                      │        │
//!                                      │        ▼ Vec<ShelfCommand>
//!                                      └─► effect.execute(cmd) for each effect
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, debug_span, error, info, Instrument};

use crate::controller::ShelfController;
use crate::deps::ShelfDeps;
use crate::error::ConfigError;
use crate::event::{ShelfCommand, ShelfEvent};
use crate::layout::ShelfLayout;
use crate::scene::SceneBindings;

/// Executes shelf commands against the runtime (scene, network, UI).
///
/// Effects receive every command and ignore the ones they do not handle.
/// A failing effect is logged and does not stop the engine.
#[async_trait]
pub trait Effect: Send + Sync + 'static {
    async fn execute(&self, cmd: ShelfCommand) -> anyhow::Result<()>;
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("shelf engine has stopped")]
pub struct EngineStopped;

#[derive(Debug)]
enum Message {
    Event(ShelfEvent),
    Reload,
    Shutdown,
}

/// Cloneable sender side of a running [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl EngineHandle {
    pub fn emit(&self, event: ShelfEvent) -> Result<(), EngineStopped> {
        self.tx.send(Message::Event(event)).map_err(|_| EngineStopped)
    }

    /// Rebuild the books from storage, e.g. after another shelf archived one.
    pub fn reload(&self) -> Result<(), EngineStopped> {
        self.tx.send(Message::Reload).map_err(|_| EngineStopped)
    }

    /// Stop after the events already queued have been handled.
    pub fn shutdown(&self) -> Result<(), EngineStopped> {
        self.tx.send(Message::Shutdown).map_err(|_| EngineStopped)
    }
}

pub struct EngineBuilder {
    deps: ShelfDeps,
    layout: ShelfLayout,
    scene: Option<SceneBindings>,
    effects: Vec<Arc<dyn Effect>>,
}

impl EngineBuilder {
    pub fn new(deps: ShelfDeps) -> Self {
        Self {
            deps,
            layout: ShelfLayout::default(),
            scene: None,
            effects: Vec::new(),
        }
    }

    pub fn with_layout(mut self, layout: ShelfLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Scene wiring. Defaults to [`SceneBindings::uniform`] for the layout's slot count.
    pub fn with_scene(mut self, scene: SceneBindings) -> Self {
        self.scene = Some(scene);
        self
    }

    pub fn with_effect<E: Effect>(mut self, effect: E) -> Self {
        self.effects.push(Arc::new(effect));
        self
    }

    pub fn with_shared_effect(mut self, effect: Arc<dyn Effect>) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn build(self) -> Result<(Engine, EngineHandle), ConfigError> {
        let scene = self
            .scene
            .unwrap_or_else(|| SceneBindings::uniform(self.layout.len()));
        let controller = ShelfController::new(self.deps, self.layout, &scene)?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok((
            Engine {
                controller,
                effects: self.effects,
                rx,
            },
            EngineHandle { tx },
        ))
    }
}

pub struct Engine {
    controller: ShelfController,
    effects: Vec<Arc<dyn Effect>>,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Engine {
    pub fn controller(&self) -> &ShelfController {
        &self.controller
    }

    /// Load the shelf, then handle events until shutdown or until every
    /// handle is dropped. Returns the controller for inspection.
    pub async fn run(mut self) -> ShelfController {
        let commands = self.controller.load();
        self.execute(commands).await;

        while let Some(message) = self.rx.recv().await {
            match message {
                Message::Event(event) => {
                    let span = debug_span!("shelf_event", kind = ?event.kind());
                    let decision = span.in_scope(|| self.controller.handle(&event));
                    self.execute(decision.commands).instrument(span).await;
                }
                Message::Reload => {
                    let commands = self.controller.load();
                    self.execute(commands).await;
                }
                Message::Shutdown => {
                    info!("shelf engine shutting down");
                    break;
                }
            }
        }
        self.controller
    }

    async fn execute(&self, commands: Vec<ShelfCommand>) {
        for cmd in commands {
            match cmd.to_json() {
                Ok(json) => debug!(command = %json, "executing"),
                Err(err) => debug!(command = ?cmd, error = %err, "executing unserializable command"),
            }
            for effect in &self.effects {
                if let Err(err) = effect.execute(cmd.clone()).await {
                    error!(command = ?cmd, error = %err, "effect failed");
                }
            }
        }
    }
}
