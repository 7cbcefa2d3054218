//! Contact records and the conversation state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where a contact currently sits in the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStage {
    /// Delayed welcome messages are still being delivered.
    WelcomeSequence,
    /// Waiting for the contact to pick a menu option.
    AwaitingChoice,
    /// Free text is treated as FAQ questions.
    AnsweringQuestions,
    /// Waiting for documents through the upload link.
    DocumentCollection,
    /// A human operator owns the conversation; the bot stays silent.
    WithHuman,
}

impl ConversationStage {
    /// Whether a transition from `self` to `target` is allowed.
    ///
    /// `WithHuman` only releases back to the menu; everything else moves
    /// freely between the active stages.
    pub fn can_transition_to(&self, target: ConversationStage) -> bool {
        use ConversationStage::*;
        matches!(
            (self, target),
            (WelcomeSequence, AwaitingChoice)
                | (WelcomeSequence, AnsweringQuestions)
                | (WelcomeSequence, DocumentCollection)
                | (WelcomeSequence, WithHuman)
                | (AwaitingChoice, AnsweringQuestions)
                | (AwaitingChoice, DocumentCollection)
                | (AwaitingChoice, WithHuman)
                | (AnsweringQuestions, AwaitingChoice)
                | (AnsweringQuestions, DocumentCollection)
                | (AnsweringQuestions, WithHuman)
                | (DocumentCollection, AwaitingChoice)
                | (DocumentCollection, AnsweringQuestions)
                | (DocumentCollection, WithHuman)
                | (WithHuman, AwaitingChoice)
        )
    }

    /// True while an operator owns the conversation.
    pub fn is_paused(&self) -> bool {
        matches!(self, ConversationStage::WithHuman)
    }
}

impl std::fmt::Display for ConversationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConversationStage::WelcomeSequence => "welcome_sequence",
            ConversationStage::AwaitingChoice => "awaiting_choice",
            ConversationStage::AnsweringQuestions => "answering_questions",
            ConversationStage::DocumentCollection => "document_collection",
            ConversationStage::WithHuman => "with_human",
        };
        write!(f, "{s}")
    }
}

/// Sub-state within [`ConversationStage::DocumentCollection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocStage {
    AwaitingDocs,
    DocsReceived,
}

impl std::fmt::Display for DocStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocStage::AwaitingDocs => "awaiting_docs",
            DocStage::DocsReceived => "docs_received",
        };
        write!(f, "{s}")
    }
}

/// Which simulator question the contact is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimStep {
    Age,
    PropertyValue,
    TermYears,
    DownPayment,
}

/// In-progress credit simulation. Cleared once the estimate is delivered
/// or the contact runs a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorState {
    pub step: SimStep,
    pub age: Option<u32>,
    pub property_value: Option<Decimal>,
    pub term_years: Option<u32>,
    pub down_payment: Option<Decimal>,
}

impl SimulatorState {
    pub fn start() -> Self {
        Self {
            step: SimStep::Age,
            age: None,
            property_value: None,
            term_years: None,
            down_payment: None,
        }
    }
}

/// A mutation applied to a contact row. Commands are grouped so related
/// fields change in a single store call.
#[derive(Debug, Clone, PartialEq)]
pub enum StateCommand {
    SetStage(ConversationStage),
    SetDocStage(Option<DocStage>),
    SetHandoffFlag(bool),
    SetSimulator(Option<SimulatorState>),
}

/// A known contact.
#[derive(Debug, Clone)]
pub struct Contact {
    pub id: i64,
    pub wa_number: String,
    pub first_name: Option<String>,
    pub instance: String,
    pub stage: ConversationStage,
    pub doc_stage: Option<DocStage>,
    pub wants_human: bool,
    pub simulator: Option<SimulatorState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
