//! The actions worker: dispatches invocations concurrently with the
//! conversation and publishes their results.
//!
//! One coordinating task owns both queues. Each invocation runs as its own
//! [`InterruptibleTask`] inside a [`JoinSet`], so a slow action never keeps
//! the worker from dequeuing the next one, and results are published in
//! completion order rather than enqueue order.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::{Id, JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::action::config::ActionConfig;
use crate::action::factory::ActionFactory;
use crate::action::{
    Action, ActionBehavior, ActionInput, ActionOutput, ActionType, ShouldRespond, TurnId,
};
use crate::error::{ActionError, WorkerError};
use crate::interruptible::InterruptibleTask;

/// How an invocation ended.
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    Completed(ActionOutput),
    Failed(ActionError),
    /// Cancelled by barge-in. Never carries a (possibly stale) result.
    Interrupted,
}

/// What the Coordinator should say about a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpokenReply {
    /// Speak this message as-is, without asking the LLM.
    Verbatim(String),
    /// Ask the LLM to compose a reply from the result or error.
    Generate,
    Silent,
}

/// A finished invocation, ready to be merged into the transcript.
///
/// Only the worker creates these; the Coordinator consumes and retires them.
#[derive(Debug, Clone)]
pub struct ActionResultAgentInput {
    pub conversation_id: String,
    pub turn_id: TurnId,
    pub invocation_id: Uuid,
    pub action_type: ActionType,
    pub behavior: ActionBehavior,
    pub outcome: ActionOutcome,
    pub completed_at: DateTime<Utc>,
}

impl ActionResultAgentInput {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Completed(_))
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Interrupted)
    }

    pub fn output(&self) -> Option<&ActionOutput> {
        match &self.outcome {
            ActionOutcome::Completed(output) => Some(output),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ActionError> {
        match &self.outcome {
            ActionOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn spoken_reply(&self) -> SpokenReply {
        match &self.outcome {
            ActionOutcome::Interrupted => SpokenReply::Silent,
            ActionOutcome::Failed(_) if self.behavior.quiet => SpokenReply::Silent,
            ActionOutcome::Failed(_) => SpokenReply::Generate,
            ActionOutcome::Completed(output) => match &output.agent_message {
                Some(message) => SpokenReply::Verbatim(message.clone()),
                None if self.behavior.should_respond == ShouldRespond::Never => SpokenReply::Silent,
                None => SpokenReply::Generate,
            },
        }
    }
}

/// How the worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Every producer hung up and all in-flight invocations were published.
    Drained,
    /// The conversation was torn down. In-flight invocations were cancelled
    /// and queued ones discarded without individual results.
    ConversationEnded { cancelled: usize, discarded: usize },
}

enum Command {
    Invoke(ActionInput),
    Interrupt(TurnId),
}

/// Correlation data kept by the coordinating task while an invocation runs.
#[derive(Debug, Clone)]
struct Invocation {
    conversation_id: String,
    turn_id: TurnId,
    invocation_id: Uuid,
    action_type: ActionType,
}

impl Invocation {
    fn of(input: &ActionInput) -> Self {
        Invocation {
            conversation_id: input.conversation_id.clone(),
            turn_id: input.turn_id,
            invocation_id: input.invocation_id,
            action_type: input.action_type().clone(),
        }
    }

    fn finish(self, behavior: ActionBehavior, outcome: ActionOutcome) -> ActionResultAgentInput {
        ActionResultAgentInput {
            conversation_id: self.conversation_id,
            turn_id: self.turn_id,
            invocation_id: self.invocation_id,
            action_type: self.action_type,
            behavior,
            outcome,
            completed_at: Utc::now(),
        }
    }
}

/// Producer side handed to the Coordinator.
#[derive(Clone)]
pub struct ActionsWorkerHandle {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
}

impl ActionsWorkerHandle {
    /// Queue an invocation. Never blocks.
    pub fn enqueue(&self, input: ActionInput) -> Result<(), WorkerError> {
        if self.shutdown.is_cancelled() {
            return Err(WorkerError::InputClosed);
        }
        self.commands
            .send(Command::Invoke(input))
            .map_err(|_| WorkerError::InputClosed)
    }

    /// Barge-in: cancel the interruptible invocations of `turn_id`.
    ///
    /// Ordered with respect to [`enqueue`](Self::enqueue): everything queued
    /// for the turn before this call is covered.
    pub fn interrupt(&self, turn_id: TurnId) -> Result<(), WorkerError> {
        self.commands
            .send(Command::Interrupt(turn_id))
            .map_err(|_| WorkerError::InputClosed)
    }

    /// Conversation teardown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Consumer side handed to the Coordinator. Results arrive in completion order.
pub struct ActionResults {
    results: mpsc::UnboundedReceiver<ActionResultAgentInput>,
}

impl ActionResults {
    /// Next result, or `None` once the worker has stopped and everything was read.
    pub async fn dequeue(&mut self) -> Option<ActionResultAgentInput> {
        self.results.recv().await
    }

    pub fn try_dequeue(&mut self) -> Option<ActionResultAgentInput> {
        self.results.try_recv().ok()
    }
}

pub struct ActionsWorker {
    factory: Arc<dyn ActionFactory>,
    commands: mpsc::UnboundedReceiver<Command>,
    results: mpsc::UnboundedSender<ActionResultAgentInput>,
    shutdown: CancellationToken,
    tasks: JoinSet<ActionResultAgentInput>,
    /// Correlation data for every running task, so a panic can still be reported.
    running: HashMap<Id, (Invocation, ActionBehavior)>,
    /// Barge-in tokens for turns with interruptible invocations in flight.
    turns: HashMap<TurnId, CancellationToken>,
    /// Interruptible invocation -> the turn whose token it holds.
    in_flight_turns: HashMap<Uuid, TurnId>,
    /// Actions are configuration-only, so one instance per distinct config is reused.
    resolved: HashMap<String, Arc<dyn Action>>,
}

impl ActionsWorker {
    pub fn new(factory: Arc<dyn ActionFactory>) -> (Self, ActionsWorkerHandle, ActionResults) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let worker = ActionsWorker {
            factory,
            commands: command_rx,
            results: result_tx,
            shutdown: shutdown.clone(),
            tasks: JoinSet::new(),
            running: HashMap::new(),
            turns: HashMap::new(),
            in_flight_turns: HashMap::new(),
            resolved: HashMap::new(),
        };
        let handle = ActionsWorkerHandle {
            commands: command_tx,
            shutdown,
        };
        let results = ActionResults { results: result_rx };
        (worker, handle, results)
    }

    /// Run the worker on its own task.
    pub fn spawn(self) -> JoinHandle<Result<WorkerStatus, WorkerError>> {
        tokio::spawn(self.run())
    }

    /// Consume commands until shutdown, or until every handle is dropped and
    /// the in-flight invocations have been published.
    ///
    /// Returns an error only for worker-level faults; action failures are
    /// published as results.
    pub async fn run(mut self) -> Result<WorkerStatus, WorkerError> {
        log::info!("Actions worker started");
        let mut accepting = true;

        while accepting || !self.tasks.is_empty() {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    return Ok(self.teardown().await);
                }
                Some(joined) = self.tasks.join_next_with_id(), if !self.tasks.is_empty() => {
                    let result = match joined {
                        Ok((id, result)) => {
                            self.running.remove(&id);
                            result
                        }
                        Err(err) => self.recover(err)?,
                    };
                    self.publish(result)?;
                }
                command = self.commands.recv(), if accepting => match command {
                    Some(Command::Invoke(input)) => self.dispatch(input)?,
                    Some(Command::Interrupt(turn_id)) => self.interrupt(turn_id),
                    None => {
                        log::debug!("All action producers hung up, draining in-flight actions");
                        accepting = false;
                    }
                },
            }
        }

        log::info!("Actions worker drained");
        Ok(WorkerStatus::Drained)
    }

    fn dispatch(&mut self, input: ActionInput) -> Result<(), WorkerError> {
        let invocation = Invocation::of(&input);

        let action = match self.resolve(&input.action_config) {
            Ok(action) => action,
            Err(err) => {
                log::warn!(
                    "[{}] {} {}: could not resolve action {}: {}",
                    invocation.conversation_id,
                    invocation.turn_id,
                    invocation.invocation_id,
                    invocation.action_type,
                    err
                );
                return self.publish(
                    invocation.finish(ActionBehavior::default(), ActionOutcome::Failed(err)),
                );
            }
        };

        let behavior = action.behavior();
        let token = if behavior.is_interruptible {
            self.in_flight_turns
                .insert(invocation.invocation_id, invocation.turn_id);
            let shutdown = &self.shutdown;
            self.turns
                .entry(invocation.turn_id)
                .or_insert_with(|| shutdown.child_token())
                .child_token()
        } else {
            self.shutdown.child_token()
        };

        log::debug!(
            "[{}] {} {}: dispatching {}",
            invocation.conversation_id,
            invocation.turn_id,
            invocation.invocation_id,
            invocation.action_type
        );

        let tracked = (invocation.clone(), behavior);
        let spawned = self.tasks.spawn(async move {
            let task = InterruptibleTask::new(action.run(input), behavior.is_interruptible, token);
            let outcome = match task.run().await {
                Ok(Ok(output)) => {
                    if let Err(err) = action.after_run(&output).await {
                        log::warn!(
                            "[{}] {}: after_run hook failed: {}",
                            invocation.conversation_id,
                            invocation.invocation_id,
                            err
                        );
                    }
                    ActionOutcome::Completed(output)
                }
                Ok(Err(err)) => {
                    log::warn!(
                        "[{}] {} {}: action {} failed: {}",
                        invocation.conversation_id,
                        invocation.turn_id,
                        invocation.invocation_id,
                        invocation.action_type,
                        err
                    );
                    ActionOutcome::Failed(err)
                }
                Err(_) => ActionOutcome::Interrupted,
            };
            invocation.finish(behavior, outcome)
        });
        self.running.insert(spawned.id(), tracked);
        Ok(())
    }

    /// Turn a panicked task into a failed result for its invocation.
    fn recover(&mut self, err: JoinError) -> Result<ActionResultAgentInput, WorkerError> {
        let tracked = self.running.remove(&err.id());
        let (invocation, behavior) = match tracked {
            Some(tracked) if err.is_panic() => tracked,
            _ => {
                log::error!("Action task failed: {}", err);
                return Err(err.into());
            }
        };

        let message = panic_message(err.into_panic());
        log::error!(
            "[{}] {} {}: action {} panicked: {}",
            invocation.conversation_id,
            invocation.turn_id,
            invocation.invocation_id,
            invocation.action_type,
            message
        );
        Ok(invocation.finish(behavior, ActionOutcome::Failed(ActionError::Panicked(message))))
    }

    fn resolve(&mut self, config: &ActionConfig) -> Result<Arc<dyn Action>, ActionError> {
        let key = config.fingerprint()?;
        if let Some(action) = self.resolved.get(&key) {
            return Ok(Arc::clone(action));
        }
        let action = self.factory.create(config)?;
        self.resolved.insert(key, Arc::clone(&action));
        Ok(action)
    }

    fn interrupt(&mut self, turn_id: TurnId) {
        if let Some(token) = self.turns.remove(&turn_id) {
            log::info!("Barge-in on {}, cancelling its interruptible actions", turn_id);
            token.cancel();
            self.in_flight_turns.retain(|_, turn| *turn != turn_id);
        }
    }

    fn publish(&mut self, result: ActionResultAgentInput) -> Result<(), WorkerError> {
        if let Some(turn_id) = self.in_flight_turns.remove(&result.invocation_id) {
            if !self.in_flight_turns.values().any(|turn| *turn == turn_id) {
                self.turns.remove(&turn_id);
            }
        }

        log::debug!(
            "[{}] {} {}: publishing result of {}",
            result.conversation_id,
            result.turn_id,
            result.invocation_id,
            result.action_type
        );
        self.results.send(result).map_err(|_| {
            log::error!("Action results consumer is gone, stopping the worker");
            WorkerError::OutputClosed
        })
    }

    async fn teardown(mut self) -> WorkerStatus {
        let cancelled = self.tasks.len();
        self.tasks.shutdown().await;

        self.commands.close();
        let mut discarded = 0;
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Invoke(_) = command {
                discarded += 1;
            }
        }

        log::info!(
            "Conversation ended: {} action(s) cancelled, {} discarded",
            cancelled,
            discarded
        );
        WorkerStatus::ConversationEnded {
            cancelled,
            discarded,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
