//! Prompt templates.
//!
//! Template text is data handed to the protocol at construction, never
//! embedded at call sites. Placeholders are `{name}`; unknown placeholders
//! are left untouched so literal JSON braces in templates survive.
//! Every field can be overridden from a TOML file; missing fields keep the
//! built-in text.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read templates from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse templates: {0}")]
    Parse(String),
}

/// Substitute `{key}` placeholders.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Every prompt the pipeline sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    pub turn_system: String,
    pub turn_user: String,
    pub turn_last_dialogue: String,
    pub starting_agent_system: String,
    pub starting_agent_user: String,
    pub stop_vote_system: String,
    pub stop_vote_user: String,
    pub best_summary_system: String,
    pub best_summary_user: String,
    pub social_roles_system: String,
    pub social_roles_user: String,
    pub scene_check_system: String,
    pub scene_check_user: String,
    pub director_rejection: String,
    pub special_effects_system: String,
    pub special_effects_user: String,
    pub refine_system: String,
    pub refine_user: String,
    pub refine_director_feedback: String,
    pub detect_ai_system: String,
    pub detect_ai_user: String,
    pub humanize_system: String,
    pub humanize_user: String,
    pub tldr_system: String,
    pub tldr_user: String,
    pub meeting_summary_system: String,
    pub meeting_summary_user: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            turn_system: "You are {role}, taking part in a {meeting_type} held in {language}.\n\n\
                {persona}\n\n\
                Speak only as yourself, in your own style, and keep to the purpose of the current scene."
                .into(),
            turn_user: "Scene description:\n{scene_description}\n\n\
                Director notes:\n{director_notes}\n\n\
                Summaries of earlier scenes:\n{previous_scenes}\n\n\
                {last_dialogue_section}\
                Dialogue so far:\n{draft}\n\n\
                Other participants:\n{remaining_agents}\n\n\
                Reply with one JSON object and nothing else:\n\
                {\"turn\": \"<your next utterance in {language}>\", \
                \"wants_vote\": <true if the scene may be complete>, \
                \"next_speaker\": <number of the participant who should speak next>}"
                .into(),
            turn_last_dialogue: "Last dialogue of the previous scene:\n{last_dialogue}\n\n".into(),
            starting_agent_system: "You coordinate a {meeting_type}. Choose who should open the next scene."
                .into(),
            starting_agent_user: "Scene description:\n{scene_description}\n\n\
                Summary of the previous scene:\n{previous_summary}\n\n\
                Participants:\n{agents}\n\n\
                Reply with only the number of the participant who should speak first."
                .into(),
            stop_vote_system: "You are {role}.\n\n{persona}\n\n\
                Decide whether the current scene has covered its plan and should end."
                .into(),
            stop_vote_user: "Scene plan:\n{scene_plan}\n\n\
                Source article:\n{article}\n\n\
                Dialogue so far:\n{draft}\n\n\
                Reply with one JSON object: {\"reasoning\": \"<short reason>\", \"vote\": <0 to stop, 1 to continue>}"
                .into(),
            best_summary_system: "You are {role}.\n\n{persona}\n\n\
                What you remember of the meeting so far:\n{memory_context}"
                .into(),
            best_summary_user: "Candidate summaries:\n{candidates}\n\n\
                Reply with only the number of the best candidate."
                .into(),
            social_roles_system: "You assign group social roles to meeting participants for one scene.\n\n\
                Available roles:\n{catalog}"
                .into(),
            social_roles_user: "Scene description:\n{scene_description}\n\n\
                Participants:\n{agents}\n\n\
                For every participant give one or more social roles from the list and a one-sentence \
                description of how they play each role in this scene. Reply as JSON: \
                {\"assignments\": [{\"role\": \"...\", \"social_roles\": [\"...\"], \"social_roles_descr\": [\"...\"]}]}"
                .into(),
            scene_check_system: "You are the director of a {meeting_type} held in {language}. \
                Judge whether a scene follows its description and reads like a real meeting."
                .into(),
            scene_check_user: "Scene description:\n{scene_description}\n\n\
                Scene:\n{scene}\n\n\
                Reply with one JSON object: {\"explanation\": \"<feedback for the participants>\", \
                \"accept_scene\": <true or false>}"
                .into(),
            director_rejection: "\n**Rejected Scene (snippet):** {snippet}\n**Director Feedback:** {feedback}\n"
                .into(),
            special_effects_system: "You edit scenes from a {meeting_type} held in {language}, adding one \
                natural disruption such as an interruption, a side remark, or a technical hiccup. \
                Any disruption that needs a response must receive one."
                .into(),
            special_effects_user: "Original scene:\n{scene}\n\n\
                Participants:\n{participants}\n\n\
                Introduce at most one special effect and keep everything else intact. Respond with:\n\
                ###Modified Scene###:\n<the modified scene>"
                .into(),
            refine_system: "You polish scenes from a {meeting_type} held in {language}: remove repetition, \
                tighten phrasing, and keep each speaker's voice."
                .into(),
            refine_user: "Scene description:\n{scene_description}\n\n\
                {director_feedback_section}\
                Scene:\n{scene}\n\n\
                Keep every line in the form `>>Role: utterance`. Respond with:\n\
                ###Refined Scene###:\n<the refined scene>"
                .into(),
            refine_director_feedback: "Director feedback still to address:\n{feedback}\n\n".into(),
            detect_ai_system: "You spot passages in meeting dialogue that do not sound like real people \
                talking in {language}."
                .into(),
            detect_ai_user: "Scene:\n{scene}\n\n\
                List what sounds artificial and how to fix it, inside <feedback></feedback> tags."
                .into(),
            humanize_system: "You rewrite meeting dialogue in {language} so it sounds natural, \
                addressing the feedback you are given."
                .into(),
            humanize_user: "Scene:\n{scene}\n\n\
                Feedback:\n{feedback}\n\n\
                Keep every line in the form `>>Role: utterance`. Put the rewritten scene inside \
                <final_scene></final_scene> tags."
                .into(),
            tldr_system: "You write one- or two-sentence summaries of meeting scenes in {language}.".into(),
            tldr_user: "Scene:\n{scene}\n\nTL;DR:".into(),
            meeting_summary_system: "You summarize source material as if it had been discussed in a \
                {meeting_type}, in the compact style of professional meeting minutes, in {language}. \
                Use at most {max_words} words in one or two paragraphs without lists."
                .into(),
            meeting_summary_user: "Meeting type: {meeting_type}\n\n\
                Title: {article_title}\n\n\
                Content:\n{content}\n\n\
                Reply as JSON: {\"summary\": \"<the summary>\"}"
                .into(),
        }
    }
}

impl PromptTemplates {
    pub fn from_toml_str(text: &str) -> Result<Self, TemplateError> {
        toml::from_str(text).map_err(|e| TemplateError::Parse(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, TemplateError> {
        let text = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
