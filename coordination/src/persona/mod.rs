//! Meeting participants.
//!
//! A [`Persona`] is a typed record with explicit defaults for every optional
//! attribute. A [`Roster`] validates a set of personas once, at meeting
//! creation, and answers the index questions the discussion engine asks
//! (who may open a scene, who remains after the current speaker).

pub mod social_roles;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use social_roles::{
    catalog_listing, SocialRole, SocialRoleAssignment, SocialRoleAssignments, SOCIAL_ROLE_CATALOG,
};

/// Minimum participants for a discussion to have a "next speaker".
pub const MIN_PARTICIPANTS: usize = 2;

/// How a persona speaks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakingStyle {
    pub tone: String,
    pub language_complexity: String,
    pub communication_style: String,
    pub sentence_structure: String,
    pub formality: String,
    pub other_traits: String,
}

/// Words and habits a persona reaches for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalizedVocabulary {
    pub filler_words: Vec<String>,
    pub catchphrases: Vec<String>,
    pub speech_patterns: Vec<String>,
    pub emotional_expressions: Vec<String>,
}

/// A simulated meeting participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// Unique participant identifier, also the speaker label in transcripts.
    pub role: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub expertise_area: String,
    #[serde(default)]
    pub perspective: String,
    #[serde(default)]
    pub social_roles: Vec<String>,
    #[serde(default)]
    pub social_roles_descr: Vec<String>,
    #[serde(default)]
    pub speaking_style: SpeakingStyle,
    #[serde(default)]
    pub personalized_vocabulary: PersonalizedVocabulary,
}

impl Persona {
    pub fn new(role: &str, description: &str) -> Self {
        Self {
            role: role.to_string(),
            description: description.to_string(),
            expertise_area: String::new(),
            perspective: String::new(),
            social_roles: Vec::new(),
            social_roles_descr: Vec::new(),
            speaking_style: SpeakingStyle::default(),
            personalized_vocabulary: PersonalizedVocabulary::default(),
        }
    }

    /// Multi-line profile block for persona-bound prompts. Empty attributes
    /// are omitted.
    pub fn profile(&self) -> String {
        let mut lines = vec![format!("Role: {}", self.role)];
        push_field(&mut lines, "Description", &self.description);
        push_field(&mut lines, "Expertise", &self.expertise_area);
        push_field(&mut lines, "Perspective", &self.perspective);

        if !self.social_roles.is_empty() {
            let roles = self
                .social_roles
                .iter()
                .enumerate()
                .map(|(i, name)| match self.social_roles_descr.get(i) {
                    Some(d) if !d.is_empty() => format!("{name} ({d})"),
                    _ => name.clone(),
                })
                .collect::<Vec<_>>()
                .join("; ");
            lines.push(format!("Social roles: {roles}"));
        }

        let style = &self.speaking_style;
        let style_parts: Vec<String> = [
            ("tone", &style.tone),
            ("language complexity", &style.language_complexity),
            ("communication style", &style.communication_style),
            ("sentence structure", &style.sentence_structure),
            ("formality", &style.formality),
            ("other traits", &style.other_traits),
        ]
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}: {v}"))
        .collect();
        if !style_parts.is_empty() {
            lines.push(format!("Speaking style: {}", style_parts.join(", ")));
        }

        let vocab = &self.personalized_vocabulary;
        for (label, words) in [
            ("Filler words", &vocab.filler_words),
            ("Catchphrases", &vocab.catchphrases),
            ("Speech patterns", &vocab.speech_patterns),
            ("Emotional expressions", &vocab.emotional_expressions),
        ] {
            if !words.is_empty() {
                lines.push(format!("{label}: {}", words.join(", ")));
            }
        }

        lines.join("\n")
    }
}

fn push_field(lines: &mut Vec<String>, label: &str, value: &str) {
    if !value.is_empty() {
        lines.push(format!("{label}: {value}"));
    }
}

/// Roster validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersonaError {
    #[error("Roster needs at least {need} participants, got {got}")]
    TooFewParticipants { got: usize, need: usize },

    #[error("Participant at position {0} has an empty role")]
    EmptyRole(usize),

    #[error("Duplicate participant role: {0}")]
    DuplicateRole(String),

    #[error("Participant {role} has {roles} social roles but {descriptions} descriptions")]
    MismatchedSocialRoles {
        role: String,
        roles: usize,
        descriptions: usize,
    },
}

/// A validated, ordered set of personas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Roster {
    personas: Vec<Persona>,
}

impl Roster {
    pub fn new(personas: Vec<Persona>) -> Result<Self, PersonaError> {
        if personas.len() < MIN_PARTICIPANTS {
            return Err(PersonaError::TooFewParticipants {
                got: personas.len(),
                need: MIN_PARTICIPANTS,
            });
        }
        for (i, p) in personas.iter().enumerate() {
            if p.role.trim().is_empty() {
                return Err(PersonaError::EmptyRole(i));
            }
            if personas[..i].iter().any(|other| other.role == p.role) {
                return Err(PersonaError::DuplicateRole(p.role.clone()));
            }
            if p.social_roles.len() != p.social_roles_descr.len() {
                return Err(PersonaError::MismatchedSocialRoles {
                    role: p.role.clone(),
                    roles: p.social_roles.len(),
                    descriptions: p.social_roles_descr.len(),
                });
            }
        }
        Ok(Self { personas })
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Persona> {
        self.personas.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Persona> {
        self.personas.iter()
    }

    pub fn as_slice(&self) -> &[Persona] {
        &self.personas
    }

    pub fn index_of(&self, role: &str) -> Option<usize> {
        self.personas.iter().position(|p| p.role == role)
    }

    /// Role label at `index`. Indices handed out by the roster itself are
    /// always in range; anything else yields an empty label.
    pub fn role(&self, index: usize) -> &str {
        self.personas
            .get(index)
            .map(|p| p.role.as_str())
            .unwrap_or("")
    }

    /// Agents allowed to open a scene: everyone except the previous scene's
    /// last speaker, when one is known and present on the roster.
    pub fn eligible_starters(&self, last_speaker: Option<&str>) -> Vec<usize> {
        (0..self.personas.len())
            .filter(|&i| last_speaker != Some(self.personas[i].role.as_str()))
            .collect()
    }

    /// Everyone except `speaker`, in roster order.
    pub fn remaining_after(&self, speaker: usize) -> Vec<usize> {
        (0..self.personas.len()).filter(|&i| i != speaker).collect()
    }

    /// Numbered (1-based) listing of the given roster indices.
    pub fn listing(&self, indices: &[usize]) -> String {
        indices
            .iter()
            .enumerate()
            .filter_map(|(n, &i)| {
                self.personas.get(i).map(|p| {
                    if p.description.is_empty() {
                        format!("{}. {}", n + 1, p.role)
                    } else {
                        format!("{}. {}: {}", n + 1, p.role, p.description)
                    }
                })
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Replace social roles for every persona named in `assignments`.
    /// Returns how many personas were updated; unknown roles are ignored.
    pub fn apply_social_roles(&mut self, assignments: &SocialRoleAssignments) -> usize {
        let mut updated = 0;
        for a in &assignments.assignments {
            if let Some(p) = self.personas.iter_mut().find(|p| p.role == a.role) {
                p.social_roles = a.social_roles.clone();
                p.social_roles_descr = a.social_roles_descr.clone();
                updated += 1;
            }
        }
        updated
    }
}
