//! Instruction payloads sent to the model gateway.
//!
//! The wording is policy, not code: the decoder and the decision blend never rely on the
//! model following it, they validate whatever comes back.

use crate::analyze::types::UserClaim;

pub const EMPTY_DESCRIPTION_MARKER: &str = "No user description was provided.";

const IMAGE_HEADER: &str = "\
You are an intelligent incident classification agent.
Here is an image to analyze.
Task: analyze the image and return only a JSON object with these fields:
- disaster_probability (float 0.0-1.0): confidence that the image shows a real incident
- disaster_type (string): one of the defined types
- disaster_severity (string): Low | Medium | High (based solely on human impact)
- reasoning (string): short rationale referencing people-risk factors and how the probability was reached

IMPORTANT: respond ONLY with the JSON object, no markdown, no commentary, no preface, no trailing notes.
Compare the detected type and severity with the ones reported by the user. If they differ significantly, say so in the reasoning.
";

const INCIDENT_DEFINITION: &str = "\
Definition of incident:
An incident is any unplanned hazardous event that threatens people, property, or the environment beyond a single individual. Visual cues:
1. Earthquake - collapsed walls, tilted structures, rubble
2. Flood - water covering roads or buildings, people wading
3. Wildfire - flames, smoke plumes, burning vegetation
4. Building Collapse - fallen beams, crushed vehicles, debris field
5. Urban/Industrial Fire - localized flames, billowing smoke from structures
6. Traffic Accident - damaged vehicles, skid marks, injured persons roadside
7. Chemical Spill / Hazardous Material - colored liquid pooling, warning placards
8. Medical Emergency - person lying motionless, first-responder activity
9. Armed Conflict / Explosion - blast damage, smoke clouds, armed individuals
10. Disease Outbreak - people wearing masks, medical tents, crowded clinics
11. Other - any other hazard not covered above
";

const DANGER_LEVELS: &str = "\
People impact danger levels:
- Low: 2 or fewer people exposed, no visible distress or injury
- Medium: 3 to 10 people exposed, some alarm, minor injuries or difficulty moving
- High: more than 10 people exposed, visible panic, serious injury, or life-threatening conditions
";

const PROBABILITY_COMPOSITION: &str = "\
How to compose disaster_probability:
- 80% of the score comes from the visual evidence of a real incident.
- 10% comes from the match with the user-reported type: full credit on an exact match, partial credit when the types are related, nothing when unrelated.
- 10% comes from the detected severity: add 0.03 for Low, 0.06 for Medium, 0.10 for High.
";

const AUTHENTICITY_PRODUCTION: &str = "\
Authenticity:
- Check whether the image is AI-generated, a cartoon, or otherwise artificial. If so, reduce the probability substantially; if it is clearly artificial, return a probability close to 0.0.
- Photos of a screen (monitor, phone, TV) are not live captures: treat them as artificial.
";

const AUTHENTICITY_DEMO: &str = "\
Authenticity:
- Check whether the image is AI-generated, a cartoon, or otherwise artificial. If so, reduce the probability substantially; if it is clearly artificial, return a probability close to 0.0.
- Demo mode: the image may be a photo of a screen showing real footage. Do not penalize screen capture itself; judge the footage shown.
";

const LOW_CONFIDENCE: &str = "\
Low confidence:
If disaster_probability < 0.2, set disaster_type to \"Other\", disaster_severity to \"Low\" and reasoning to \"Low confidence in any hazardous conditions.\"
";

/// Parameters for the image-only analysis instructions.
#[derive(Debug, Clone, Copy)]
pub struct ImagePrompt<'a> {
    pub known_types: &'a [String],
    pub demo_mode: bool,
}

impl ImagePrompt<'_> {
    pub fn instructions(&self) -> String {
        let mut out = String::with_capacity(4096);
        out.push_str(IMAGE_HEADER);
        out.push('\n');
        out.push_str(INCIDENT_DEFINITION);
        out.push('\n');
        if !self.known_types.is_empty() {
            out.push_str("Valid values for disaster_type (use one of these exactly):\n");
            for t in self.known_types {
                out.push_str("- ");
                out.push_str(t);
                out.push('\n');
            }
            out.push('\n');
        }
        out.push_str(DANGER_LEVELS);
        out.push('\n');
        out.push_str(PROBABILITY_COMPOSITION);
        out.push('\n');
        out.push_str(if self.demo_mode {
            AUTHENTICITY_DEMO
        } else {
            AUTHENTICITY_PRODUCTION
        });
        out.push('\n');
        out.push_str(LOW_CONFIDENCE);
        out
    }
}

/// Short context string carrying what the user claimed.
pub fn user_context(claim: &UserClaim) -> String {
    format!(
        "Extra details provided by user: type of incident = '{}', severity reported = '{}'.",
        claim.incident_type.trim(),
        claim.severity.trim()
    )
}

const DESCRIPTION_RULES: &str = "\
Rules for reformulated_description:
- Plain text for public display, one to three sentences.
- Use only normal punctuation: no markdown, bullet points, asterisks, hashes, or code.
- Describe the situation itself. Do not mention images, photos, analysis, models, or automated processing.
";

/// Instructions for the description step when the user supplied nothing.
pub fn describe_only_instructions() -> String {
    format!(
        "\
You write short public incident summaries.
{EMPTY_DESCRIPTION_MARKER}
Using only the analysis reasoning below, write a reformulated description of the incident.
Return only a JSON object: {{\"similarity_score\": -1, \"reformulated_description\": \"<text>\"}}
similarity_score must be exactly -1 because there is nothing to compare.

{DESCRIPTION_RULES}"
    )
}

/// Instructions for comparing a user description with the image reasoning.
pub fn compare_instructions() -> String {
    format!(
        "\
You check whether a user's incident report matches an independent analysis of the photo they sent.
Return only a JSON object: {{\"similarity_score\": <float 0.0-1.0>, \"reformulated_description\": \"<text>\"}}

Scoring similarity_score:
- Score how well the user's description matches the analysis reasoning on a continuous scale from 0.0 to 1.0.
- Do not penalize grammar, spelling, language, brevity, or paraphrasing.
- Reserve scores below 0.5 for descriptions that are factually inconsistent with the analysis or irrelevant to it.

{DESCRIPTION_RULES}
Base the reformulated description on both texts, keeping only facts consistent with the analysis."
    )
}

pub fn reasoning_context(reasoning: &str) -> String {
    format!("Analysis reasoning: {}", reasoning.trim())
}

pub fn description_context(description: &str) -> String {
    format!("User description: {}", description.trim())
}
