//! Instruction text for planning and note generation.
//!
//! Every system prompt asks for a single JSON object so replies can be
//! decoded with [`crate::generate::generate_json`].

pub const TASK_PLAN_SYSTEM: &str = "\
You are an orchestrator. Analyze a timeline of user activity and create a structured plan of tasks.

Goal: build a personal knowledge base (Second Brain). Tasks: create/update concept notes and generate reflection questions.

Rules:
- Allowed task_type values: CREATE_OR_UPDATE_NOTE, GENERATE_QUESTIONS.
- Each task has: task_id (unique, e.g. \"concept_1\"), task_type, description, related_event_ids (ids from the timeline), dependencies (task_ids that must run first).
- Each GENERATE_QUESTIONS task must depend on a CREATE_OR_UPDATE_NOTE task and its description must be \"Generate questions for '<Concept name>'\".
- Group related page events into one CREATE_OR_UPDATE_NOTE task.
- Output a JSON object with a single key \"tasks\" containing the list of tasks.";

pub fn task_plan_user(timeline: &str) -> String {
    format!("Here is the timeline of events for the day:\n\n{timeline}")
}

pub const EXTRACT_CONCEPT_SYSTEM: &str = "\
You synthesize information. From the user's text (things they've read), extract one concise concept name (2-5 words) that represents the core theme.
Respond with a JSON object {\"concept\": \"<concept name>\"} and nothing else.";

pub fn extract_concept_user(text: &str) -> String {
    format!("Here is the text to analyze:\n\n{text}")
}

pub const GENERATE_QUESTIONS_SYSTEM: &str = "\
You are a research assistant. From the given concept and note, generate 3-5 open-ended questions to deepen understanding, consider alternatives, or plan next steps.
Respond with a JSON object {\"questions_markdown\": \"<markdown list of questions>\"}.";

pub fn generate_questions_user(concept_name: &str, note: &str) -> String {
    format!("CONCEPT: {concept_name}\n\nTEXT:\n{note}")
}

pub const CONCEPT_NOTE_SYSTEM: &str = "\
You create Obsidian Markdown notes from web content. Write well-structured Markdown. Use [[WikiLinks]] for key concepts. The note is saved directly to a file.
Respond with a JSON object {\"content\": \"<markdown note>\"}.";

/// User prompt creating a new concept note or merging into an existing one.
pub fn concept_note_user(
    text: &str,
    existing_concept_titles: &[String],
    existing_note: Option<&str>,
) -> String {
    let concept_list = existing_concept_titles.join("\n- ");
    match existing_note {
        Some(existing) => format!(
            "Merge the new information into the existing note.

EXISTING NOTE:
---
{existing}
---

NEW CONTENT:
---
{text}
---

EXISTING CONCEPT NOTES:
- {concept_list}

1. Integrate new info into the note (rewrite sections, add bullets). Keep one coherent document. Preserve H1 if present.
2. Update \"Related\" with [[links]] ONLY from EXISTING CONCEPT NOTES above.
3. Update \"Tags\".
4. Output the full Markdown note."
        ),
        None => format!(
            "Create a well-structured note from this content.

CONTENT:
---
{text}
---

EXISTING CONCEPT NOTES:
- {concept_list}

1. H1 title.
2. Short summary (2-4 bullets).
3. Key points as bullets.
4. \"Related\" section: 3-7 [[WikiLinks]] ONLY from EXISTING CONCEPT NOTES above.
5. \"Tags\" section: 5-12 tags (#example)."
        ),
    }
}
