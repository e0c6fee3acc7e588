//! Group social roles and per-scene role assignment records.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::extract::Validate;

/// A functional role a participant can play in a group discussion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocialRole {
    pub name: &'static str,
    pub description: &'static str,
}

/// Catalog of task, maintenance, and individual roles offered to the
/// role-assignment call.
pub const SOCIAL_ROLE_CATALOG: [SocialRole; 22] = [
    SocialRole {
        name: "Initiator-Contributor",
        description: "Proposes new ideas or new ways of approaching the topic.",
    },
    SocialRole {
        name: "Information Giver",
        description: "Offers facts, evidence, or relevant experience.",
    },
    SocialRole {
        name: "Information Seeker",
        description: "Asks for clarification, facts, or missing detail.",
    },
    SocialRole {
        name: "Opinion Giver",
        description: "States beliefs or judgments about the matter at hand.",
    },
    SocialRole {
        name: "Opinion Seeker",
        description: "Asks others for their views and the values behind them.",
    },
    SocialRole {
        name: "Coordinator",
        description: "Connects ideas and suggestions from different members.",
    },
    SocialRole {
        name: "Evaluator-Critic",
        description: "Weighs proposals against standards and points out weaknesses.",
    },
    SocialRole {
        name: "Implementer",
        description: "Turns agreed ideas into concrete next steps.",
    },
    SocialRole {
        name: "Recorder",
        description: "Keeps track of decisions and restates what was agreed.",
    },
    SocialRole {
        name: "Encourager",
        description: "Praises and supports the contributions of others.",
    },
    SocialRole {
        name: "Harmonizer",
        description: "Mediates differences and relieves tension.",
    },
    SocialRole {
        name: "Compromiser",
        description: "Yields or meets others halfway to keep the group moving.",
    },
    SocialRole {
        name: "Gatekeeper",
        description: "Keeps communication open and invites quieter members in.",
    },
    SocialRole {
        name: "Standard Setter",
        description: "Expresses standards the group should hold itself to.",
    },
    SocialRole {
        name: "Group Observer",
        description: "Comments on how the group is working together.",
    },
    SocialRole {
        name: "Follower",
        description: "Goes along with the group and accepts others' ideas.",
    },
    SocialRole {
        name: "Aggressor",
        description: "Attacks or deflates the status of other members.",
    },
    SocialRole {
        name: "Blocker",
        description: "Resists stubbornly and reopens settled issues.",
    },
    SocialRole {
        name: "Recognition Seeker",
        description: "Draws attention to personal achievements.",
    },
    SocialRole {
        name: "Dominator",
        description: "Tries to control the discussion and the other members.",
    },
    SocialRole {
        name: "Help Seeker",
        description: "Seeks sympathy by expressing insecurity or confusion.",
    },
    SocialRole {
        name: "Special Interest Pleader",
        description: "Argues for an outside group's interests.",
    },
];

/// Render the catalog as a bulleted list for prompts.
pub fn catalog_listing() -> String {
    SOCIAL_ROLE_CATALOG
        .iter()
        .map(|r| format!("- {}: {}", r.name, r.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Social roles chosen for one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SocialRoleAssignment {
    /// Participant role this assignment applies to.
    pub role: String,
    pub social_roles: Vec<String>,
    /// One description per entry in `social_roles`.
    pub social_roles_descr: Vec<String>,
}

/// Structured response of the role-assignment call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SocialRoleAssignments {
    pub assignments: Vec<SocialRoleAssignment>,
}

impl Validate for SocialRoleAssignments {
    fn validate(&self) -> Result<(), String> {
        if self.assignments.is_empty() {
            return Err("no assignments returned".into());
        }
        for a in &self.assignments {
            if a.social_roles.len() != a.social_roles_descr.len() {
                return Err(format!(
                    "assignment for {} has {} roles but {} descriptions",
                    a.role,
                    a.social_roles.len(),
                    a.social_roles_descr.len()
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_unique() {
        let mut names: Vec<_> = SOCIAL_ROLE_CATALOG.iter().map(|r| r.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SOCIAL_ROLE_CATALOG.len());
    }

    #[test]
    fn test_catalog_listing() {
        let listing = catalog_listing();
        assert!(listing.starts_with("- Initiator-Contributor:"));
        assert_eq!(listing.lines().count(), 22);
    }

    #[test]
    fn test_validate_mismatched_lengths() {
        let assignments = SocialRoleAssignments {
            assignments: vec![SocialRoleAssignment {
                role: "Chair".into(),
                social_roles: vec!["Coordinator".into(), "Gatekeeper".into()],
                social_roles_descr: vec!["links ideas".into()],
            }],
        };
        let err = assignments.validate().unwrap_err();
        assert!(err.contains("2 roles but 1 descriptions"));
    }

    #[test]
    fn test_validate_empty() {
        let assignments = SocialRoleAssignments {
            assignments: vec![],
        };
        assert!(assignments.validate().is_err());
    }
}
