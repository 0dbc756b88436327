use serde::{Deserialize, Serialize};

/// The five ADKAR phases, plus the generic fallback used when a request
/// carries a stage code we do not recognize. Unknown codes must never fail
/// the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Awareness,
    Desire,
    Knowledge,
    Ability,
    Reinforcement,
    General,
}

impl Stage {
    /// Maps a wire-level stage code ("1".."5") to a stage. Anything else
    /// falls back to [`Stage::General`].
    pub fn from_code(code: &str) -> Stage {
        match code.trim() {
            "1" => Stage::Awareness,
            "2" => Stage::Desire,
            "3" => Stage::Knowledge,
            "4" => Stage::Ability,
            "5" => Stage::Reinforcement,
            _ => Stage::General,
        }
    }

    /// The five named stages in wire-code order. Excludes the
    /// [`Stage::General`] fallback, which has no code of its own.
    pub fn all() -> &'static [Stage] {
        &[
            Stage::Awareness,
            Stage::Desire,
            Stage::Knowledge,
            Stage::Ability,
            Stage::Reinforcement,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Awareness => "Awareness",
            Stage::Desire => "Desire",
            Stage::Knowledge => "Knowledge",
            Stage::Ability => "Ability",
            Stage::Reinforcement => "Reinforcement",
            Stage::General => "General",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Stage::Awareness => "Understanding why the change is needed",
            Stage::Desire => "Motivation to support the change",
            Stage::Knowledge => "Information about how to change",
            Stage::Ability => "Skills to implement the change",
            Stage::Reinforcement => "Sustaining the change",
            Stage::General => "General change management guidance",
        }
    }

    /// Example coaching prompts shown by the UI for each stage.
    pub fn example_prompts(&self) -> &'static [&'static str] {
        match self {
            Stage::Awareness => &[
                "We're implementing a new ERP system in 3 months, but employees aren't seeing the need for it.",
                "How do I help my team understand the importance of our new data privacy policy?",
                "Our department needs to restructure, but people don't see why the old structure doesn't work.",
            ],
            Stage::Desire => &[
                "Our team understands why we need the new process, but they aren't motivated to adopt it.",
                "How can I get buy-in from middle managers who are resistant to the new org structure?",
                "My employees know we need to improve quality control, but see it as extra work.",
            ],
            Stage::Knowledge => &[
                "What specific training should we provide for our team transitioning to a new CRM?",
                "What information do employees need before we switch to a remote-first model?",
                "How should we document our new approval process to ensure everyone follows it?",
            ],
            Stage::Ability => &[
                "Our team has completed training on the new software, but they're struggling to apply it.",
                "What tools can help employees build confidence using our new project management system?",
                "How do we help remote workers develop skills for effective virtual collaboration?",
            ],
            Stage::Reinforcement => &[
                "How can we ensure our recent process changes stick long-term?",
                "What metrics should we track to verify our new safety protocols are being followed?",
                "How can we recognize and reward employees who consistently adopt the new workflow?",
            ],
            Stage::General => &[],
        }
    }
}
