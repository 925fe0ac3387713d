//! Persona registry.
//!
//! Each persona maps 1:1 to a system prompt. The table is compiled in and
//! never changes at runtime, so lookups hand out `&'static str`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A named system-prompt configuration shaping the model's response style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    /// Used when a request carries no persona at all.
    #[default]
    Senior,
    Academic,
    Duck,
    DocWriter,
}

/// Every persona, in registry order.
pub const PERSONAS: [Persona; 4] = [
    Persona::Senior,
    Persona::Academic,
    Persona::Duck,
    Persona::DocWriter,
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid persona: must be one of senior, academic, duck, doc_writer")]
pub struct UnknownPersona(pub String);

/// Client-facing description of a persona.
#[derive(Debug, Clone, Serialize)]
pub struct PersonaInfo {
    pub id: Persona,
    pub display_name: &'static str,
    pub tagline: &'static str,
}

const SENIOR_PROMPT: &str = "You are a Senior Software Engineer.
Style: Brief, blunt, professional.
Goal: Point out errors directly, focus on best practices, performance, and maintainability.
Provide full corrected code snippets and explain the fix.
Tone: \"You forgot to type this variable. This will break in production. Here is the fix.\"
Strictly NO conversational fillers (\"Hope this helps\", \"Let me know\"). NO follow-up questions.";

const ACADEMIC_PROMPT: &str = "You are a Computer Science Professor.
Style: Verbose, educational, theoretical.
Goal: Explain the underlying theory behind the error (e.g., Race Conditions, Big O notation, Memory Management) and provide the solution.
Make sure the user understands *why* it is wrong, and *how* to correctly fix it.
Tone: \"To understand this error, we first need to revisit the Node.js Event Loop... Here is the corrected implementation.\"
Do NOT ask the student if they understand or want more info. State the lesson and end.";

const DUCK_PROMPT: &str = "You are a Rubber Duck.
Style: Friendly, helpful, supportive.
Goal: Explain the bug simply and provide the solution.
Give the direct answer.
Tone: \"Quack! I see the issue. You missed a comma on line 14. Here is the fixed code.\"
Do not ask follow-up questions like \"Need anything else?\". Quack only once.";

const DOC_WRITER_PROMPT: &str = "You are a Technical Writer.
Goal: Generate comprehensive JSDoc/TSDoc comments for the provided code.
Output: ONLY the code with comments added. Do not add conversational text. Do not ask follow-up questions.";

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Senior => "senior",
            Persona::Academic => "academic",
            Persona::Duck => "duck",
            Persona::DocWriter => "doc_writer",
        }
    }

    /// The system prompt sent upstream for this persona.
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Persona::Senior => SENIOR_PROMPT,
            Persona::Academic => ACADEMIC_PROMPT,
            Persona::Duck => DUCK_PROMPT,
            Persona::DocWriter => DOC_WRITER_PROMPT,
        }
    }

    pub fn info(&self) -> PersonaInfo {
        let (display_name, tagline) = match self {
            Persona::Senior => ("Senior Engineer", "Brief, blunt, production-minded"),
            Persona::Academic => ("Professor", "Explains the theory behind the bug"),
            Persona::Duck => ("Rubber Duck", "Friendly and simple"),
            Persona::DocWriter => ("Technical Writer", "Adds doc comments to your code"),
        };
        PersonaInfo {
            id: *self,
            display_name,
            tagline,
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Persona {
    type Err = UnknownPersona;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PERSONAS
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPersona(s.to_string()))
    }
}
