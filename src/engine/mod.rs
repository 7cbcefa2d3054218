//! Conversation engine — routes inbound events through the funnel.

pub mod contact;
pub mod session;
pub mod simulator;
pub mod texts;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::buffer::QuestionBuffer;
use crate::config::FunnelConfig;
use crate::engine::contact::{Contact, ConversationStage, DocStage, SimulatorState, StateCommand};
use crate::engine::session::SessionStore;
use crate::engine::simulator::SimAdvance;
use crate::error::Result;
use crate::faq::{FaqMatcher, FaqOutcome};
use crate::gateway::Outbound;
use crate::normalize::{self, Command};
use crate::queue::DelayedQueue;
use crate::store::{NewContact, Store};

/// One inbound WhatsApp message, already unwrapped from the webhook shape.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub instance: String,
    pub jid: String,
    pub push_name: Option<String>,
    pub text: String,
    pub from_me: bool,
}

/// The funnel state machine. One instance serves all contacts; every
/// dependency behind it is shareable and concurrency-safe.
pub struct Engine {
    store: Arc<dyn Store>,
    outbound: Arc<dyn Outbound>,
    matcher: FaqMatcher,
    buffer: Arc<QuestionBuffer>,
    queue: Arc<DelayedQueue>,
    sessions: Arc<SessionStore>,
    funnel: FunnelConfig,
    upload_base_url: String,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        outbound: Arc<dyn Outbound>,
        matcher: FaqMatcher,
        buffer: Arc<QuestionBuffer>,
        queue: Arc<DelayedQueue>,
        sessions: Arc<SessionStore>,
        funnel: FunnelConfig,
        upload_base_url: String,
    ) -> Self {
        Self {
            store,
            outbound,
            matcher,
            buffer,
            queue,
            sessions,
            funnel,
            upload_base_url,
        }
    }

    /// Entry point for webhook events. Never fails the caller; errors are
    /// logged here so the webhook can always ack.
    pub async fn handle_event(&self, event: InboundEvent) {
        let result = if event.from_me {
            self.handle_operator(&event).await
        } else {
            self.handle_contact(&event).await
        };
        if let Err(e) = result {
            error!(jid = %event.jid, "Event handling failed: {e}");
        }
    }

    // ── Contact messages ────────────────────────────────────────────

    async fn handle_contact(&self, event: &InboundEvent) -> Result<()> {
        let text = event.text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let number = normalize::contact_key(&event.jid);
        let canon = normalize::canonical(text);

        let Some(contact) = self.store.find_contact(&number).await? else {
            return self.handle_unknown(event, &number, &canon).await;
        };

        if contact.stage.is_paused() {
            debug!(number, "Operator owns this conversation, staying silent");
            return Ok(());
        }

        // A re-sent trigger phrase returns a known contact to the menu.
        if canon == normalize::canonical(&self.funnel.welcome_trigger)
            || canon == normalize::canonical(&self.funnel.direct_trigger)
        {
            return self.go_menu(&contact).await;
        }

        if let Some(command) = Command::parse(&canon) {
            return self.handle_command(&contact, command).await;
        }

        // An active simulator owns all free text until it finishes.
        if contact.simulator.is_some() {
            return self.handle_simulator(&contact, text).await;
        }

        match contact.stage {
            ConversationStage::WelcomeSequence => {
                debug!(number, "Free text during welcome sequence ignored");
                Ok(())
            }
            ConversationStage::AwaitingChoice => {
                self.send(&contact, &texts::menu(contact.first_name.as_deref()))
                    .await;
                Ok(())
            }
            ConversationStage::AnsweringQuestions => {
                if normalize::has_completion_marker(text) {
                    let question = self
                        .buffer
                        .consume(&contact.instance, &contact.wa_number, text)
                        .await;
                    self.answer(&contact, &question).await
                } else {
                    self.buffer
                        .push(&contact.instance, &contact.wa_number, text)
                        .await;
                    Ok(())
                }
            }
            ConversationStage::DocumentCollection => {
                let reminder = match contact.doc_stage {
                    Some(DocStage::DocsReceived) => texts::DOCS_RECEIVED_REMINDER,
                    _ => texts::DOCS_REMINDER,
                };
                self.send(&contact, reminder).await;
                Ok(())
            }
            ConversationStage::WithHuman => Ok(()),
        }
    }

    async fn handle_unknown(
        &self,
        event: &InboundEvent,
        number: &str,
        canon: &str,
    ) -> Result<()> {
        let first_name = event.push_name.as_deref().and_then(normalize::first_name);

        if canon == normalize::canonical(&self.funnel.welcome_trigger) {
            let contact = self
                .store
                .create_contact(&NewContact {
                    wa_number: number.to_string(),
                    first_name,
                    instance: event.instance.clone(),
                    stage: ConversationStage::WelcomeSequence,
                })
                .await?;
            info!(number, "New contact entering welcome sequence");
            self.send(&contact, &texts::welcome_greeting(contact.first_name.as_deref()))
                .await;
            self.queue.schedule_welcome(&contact, Utc::now()).await?;
            return Ok(());
        }

        if canon == normalize::canonical(&self.funnel.direct_trigger) {
            let contact = self
                .store
                .create_contact(&NewContact {
                    wa_number: number.to_string(),
                    first_name,
                    instance: event.instance.clone(),
                    stage: ConversationStage::AwaitingChoice,
                })
                .await?;
            info!(number, "New contact at choice menu");
            self.send(&contact, &texts::menu(contact.first_name.as_deref()))
                .await;
            return Ok(());
        }

        debug!(number, "Message from unknown contact dropped");
        Ok(())
    }

    /// Cancel anything in flight for this contact and show the menu.
    async fn go_menu(&self, contact: &Contact) -> Result<()> {
        self.queue.cancel_welcome(&contact.wa_number).await?;
        self.buffer
            .cancel(&contact.instance, &contact.wa_number)
            .await;

        let mut commands = Vec::new();
        if contact.simulator.is_some() {
            commands.push(StateCommand::SetSimulator(None));
        }
        commands.extend(stage_change(contact, ConversationStage::AwaitingChoice));
        self.store
            .apply_commands(&contact.wa_number, &commands)
            .await?;

        self.send(contact, &texts::menu(contact.first_name.as_deref()))
            .await;
        Ok(())
    }

    async fn handle_command(&self, contact: &Contact, command: Command) -> Result<()> {
        self.buffer
            .cancel(&contact.instance, &contact.wa_number)
            .await;
        if contact.stage == ConversationStage::WelcomeSequence {
            self.queue.cancel_welcome(&contact.wa_number).await?;
        }

        let mut commands = Vec::new();
        if contact.simulator.is_some() && command != Command::Simulator {
            commands.push(StateCommand::SetSimulator(None));
        }

        match command {
            Command::Question => {
                commands.extend(stage_change(contact, ConversationStage::AnsweringQuestions));
                self.store
                    .apply_commands(&contact.wa_number, &commands)
                    .await?;
                self.send(contact, texts::ASK_QUESTION).await;
            }
            Command::Advisor => {
                commands.extend(stage_change(contact, ConversationStage::DocumentCollection));
                commands.push(StateCommand::SetDocStage(Some(DocStage::AwaitingDocs)));
                self.store
                    .apply_commands(&contact.wa_number, &commands)
                    .await?;
                let upload_url = format!("{}/upload/{}", self.upload_base_url, contact.id);
                self.send(
                    contact,
                    &texts::docs_request(&upload_url, contact.first_name.as_deref()),
                )
                .await;
            }
            Command::HumanHandoff => {
                commands.extend(stage_change(contact, ConversationStage::WithHuman));
                commands.push(StateCommand::SetHandoffFlag(true));
                self.store
                    .apply_commands(&contact.wa_number, &commands)
                    .await?;
                self.send(contact, &texts::human_handoff_ack(contact.first_name.as_deref()))
                    .await;
                self.alert_admin(contact).await;
                self.queue.schedule_resume(contact, Utc::now()).await?;
                info!(number = %contact.wa_number, "Conversation handed to operator");
            }
            Command::Simulator => {
                commands.push(StateCommand::SetSimulator(Some(SimulatorState::start())));
                self.store
                    .apply_commands(&contact.wa_number, &commands)
                    .await?;
                self.send(contact, texts::SIM_ASK_AGE).await;
            }
            Command::Start => {
                commands.extend(stage_change(contact, ConversationStage::AwaitingChoice));
                self.store
                    .apply_commands(&contact.wa_number, &commands)
                    .await?;
                self.send(contact, &texts::menu(contact.first_name.as_deref()))
                    .await;
            }
        }
        Ok(())
    }

    async fn handle_simulator(&self, contact: &Contact, text: &str) -> Result<()> {
        let Some(state) = &contact.simulator else {
            return Ok(());
        };

        match crate::engine::simulator::advance(state, text, self.funnel.annual_rate) {
            SimAdvance::Reprompt(prompt) => {
                self.send(contact, prompt).await;
            }
            SimAdvance::Next(next, prompt) => {
                self.store
                    .apply_commands(
                        &contact.wa_number,
                        &[StateCommand::SetSimulator(Some(next))],
                    )
                    .await?;
                self.send(contact, prompt).await;
            }
            SimAdvance::Done(est) => {
                self.store
                    .apply_commands(&contact.wa_number, &[StateCommand::SetSimulator(None)])
                    .await?;
                let reply = texts::sim_result(
                    &est.financed.to_string(),
                    &est.monthly_payment.to_string(),
                    est.years(),
                );
                self.send(contact, &reply).await;
            }
        }
        Ok(())
    }

    /// Run a completed question through the FAQ pipeline and reply.
    async fn answer(&self, contact: &Contact, question: &str) -> Result<()> {
        let canon = normalize::canonical(question);
        if canon.chars().count() < self.funnel.min_question_len {
            self.send(contact, texts::QUESTION_TOO_SHORT).await;
            return Ok(());
        }
        if normalize::is_greeting(&canon) {
            self.send(contact, texts::GREETING_RESPONSE).await;
            return Ok(());
        }

        let asked = self.sessions.record_question(&contact.wa_number).await;
        if asked > self.funnel.question_limit {
            self.send(contact, texts::QUESTION_LIMIT_REACHED).await;
            return Ok(());
        }

        // Typing indicator while the pipeline runs; purely cosmetic.
        if let Err(e) = self
            .outbound
            .send_presence(&contact.instance, &contact.wa_number)
            .await
        {
            debug!("Presence send failed: {e}");
        }

        match self.matcher.match_question(contact, question).await {
            Ok(FaqOutcome::Answered { reply, .. }) => {
                let replies = self.sessions.record_ai_reply(&contact.wa_number).await;
                let body = if replies % self.funnel.nav_reminder_every == 0 {
                    format!("{reply}{}", texts::NAV_FOOTER)
                } else {
                    reply
                };
                self.send(contact, &body).await;
            }
            Ok(FaqOutcome::PendingCreated) => {
                self.send(contact, texts::PENDING_CREATED).await;
            }
            Ok(FaqOutcome::DuplicatePending) => {
                self.send(contact, texts::PENDING_DUPLICATE).await;
            }
            Ok(FaqOutcome::Unavailable) => {
                self.send(contact, texts::MATCH_UNAVAILABLE).await;
            }
            Err(e) => {
                error!(number = %contact.wa_number, "FAQ pipeline failed: {e}");
                self.send(contact, texts::RETRY_OR_ESCALATE).await;
            }
        }
        Ok(())
    }

    // ── Operator messages ───────────────────────────────────────────

    /// Operator phrases typed from the business's own WhatsApp. Everything
    /// else the operator writes is a normal manual reply and is ignored.
    async fn handle_operator(&self, event: &InboundEvent) -> Result<()> {
        let number = normalize::contact_key(&event.jid);
        let canon = normalize::canonical(&event.text);

        match canon.as_str() {
            "boa sorte" | "boa sorte!" => self.operator_release(&number).await,
            "deixa comigo" => self.operator_pause(&number).await,
            _ => Ok(()),
        }
    }

    async fn operator_release(&self, number: &str) -> Result<()> {
        let Some(contact) = self.store.find_contact(number).await? else {
            return Ok(());
        };
        if !contact.stage.is_paused() && !contact.wants_human {
            return Ok(());
        }
        self.store
            .apply_commands(
                number,
                &[
                    StateCommand::SetHandoffFlag(false),
                    StateCommand::SetStage(ConversationStage::AwaitingChoice),
                ],
            )
            .await?;
        self.queue.cancel_resume(number).await?;
        info!(number, "Operator released the conversation");
        Ok(())
    }

    async fn operator_pause(&self, number: &str) -> Result<()> {
        let Some(contact) = self.store.find_contact(number).await? else {
            return Ok(());
        };
        if contact.stage.is_paused() {
            return Ok(());
        }
        self.buffer
            .cancel(&contact.instance, &contact.wa_number)
            .await;
        self.store
            .apply_commands(
                number,
                &[
                    StateCommand::SetStage(ConversationStage::WithHuman),
                    StateCommand::SetHandoffFlag(true),
                ],
            )
            .await?;
        self.queue.schedule_resume(&contact, Utc::now()).await?;
        info!(number, "Operator paused the bot");
        Ok(())
    }

    // ── Shared helpers ──────────────────────────────────────────────

    async fn alert_admin(&self, contact: &Contact) {
        let Some(admin) = self.funnel.admin_number.as_deref() else {
            debug!("No admin number configured, skipping handoff alert");
            return;
        };
        let alert = texts::admin_alert(contact.first_name.as_deref(), &contact.wa_number);
        if let Err(e) = self.outbound.send_text(&contact.instance, admin, &alert).await {
            warn!("Failed to alert admin: {e}");
        }
    }

    /// Send a text to the contact. Failures are logged, never propagated;
    /// state changes must not be rolled back by a flaky gateway.
    async fn send(&self, contact: &Contact, text: &str) {
        if let Err(e) = self
            .outbound
            .send_text(&contact.instance, &contact.wa_number, text)
            .await
        {
            warn!(number = %contact.wa_number, "Failed to send message: {e}");
        }
    }
}

/// Command to move `contact` to `target`, or `None` when the move is
/// redundant or blocked by the transition matrix.
fn stage_change(contact: &Contact, target: ConversationStage) -> Option<StateCommand> {
    if contact.stage == target {
        return None;
    }
    if !contact.stage.can_transition_to(target) {
        warn!(
            number = %contact.wa_number,
            from = %contact.stage,
            to = %target,
            "Blocked stage transition"
        );
        return None;
    }
    Some(StateCommand::SetStage(target))
}
