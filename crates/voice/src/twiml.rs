//! TwiML documents returned from the voice webhooks.
//!
//! [`Twiml`] is a typed verb list; [`VoiceResponses`] wraps it with the canned
//! replies the call flow uses so every handler speaks with the same voice.

pub const DEFAULT_SAY_VOICE: &str = "Polly.Joanna-Neural";
pub const TRANSCRIBE_ACTION: &str = "/webhook/transcribe";
pub const DTMF_ACTION: &str = "/webhook/dtmf";
pub const TECHNICAL_DIFFICULTIES: &str =
    "I'm sorry, we're experiencing technical difficulties. Please try again later.";
pub const NO_INPUT_GOODBYE: &str = "We didn't receive any input. Goodbye!";

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verb {
    Say { voice: String, text: String },
    Record { action: String, max_length: u32, play_beep: bool },
    Gather {
        num_digits: u32,
        finish_on_key: String,
        action: String,
        method: String,
        prompt: Vec<Verb>,
    },
    Pause { length: u32 },
    Hangup,
}

impl Verb {
    fn render_into(&self, out: &mut String) {
        match self {
            Self::Say { voice, text } => {
                out.push_str(&format!(
                    r#"<Say voice="{}">{}</Say>"#,
                    escape_xml(voice),
                    escape_xml(text)
                ));
            }
            Self::Record { action, max_length, play_beep } => {
                out.push_str(&format!(
                    r#"<Record action="{}" maxLength="{max_length}" playBeep="{play_beep}"/>"#,
                    escape_xml(action)
                ));
            }
            Self::Gather { num_digits, finish_on_key, action, method, prompt } => {
                out.push_str(&format!(
                    r#"<Gather numDigits="{num_digits}" finishOnKey="{}" action="{}" method="{}">"#,
                    escape_xml(finish_on_key),
                    escape_xml(action),
                    escape_xml(method)
                ));
                for verb in prompt {
                    verb.render_into(out);
                }
                out.push_str("</Gather>");
            }
            Self::Pause { length } => out.push_str(&format!(r#"<Pause length="{length}"/>"#)),
            Self::Hangup => out.push_str("<Hangup/>"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Twiml {
    verbs: Vec<Verb>,
}

impl Twiml {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verb(mut self, verb: Verb) -> Self {
        self.verbs.push(verb);
        self
    }

    pub fn say(self, voice: &str, text: impl Into<String>) -> Self {
        self.verb(Verb::Say { voice: voice.to_owned(), text: text.into() })
    }

    pub fn record(self) -> Self {
        self.verb(Verb::Record {
            action: TRANSCRIBE_ACTION.to_owned(),
            max_length: 60,
            play_beep: true,
        })
    }

    pub fn pause(self, length: u32) -> Self {
        self.verb(Verb::Pause { length })
    }

    pub fn hangup(self) -> Self {
        self.verb(Verb::Hangup)
    }

    pub fn verbs(&self) -> &[Verb] {
        &self.verbs
    }

    pub fn render(&self) -> String {
        let mut out = String::from(XML_DECLARATION);
        out.push_str("<Response>");
        for verb in &self.verbs {
            verb.render_into(&mut out);
        }
        out.push_str("</Response>");
        out
    }
}

/// Canned call-flow replies rendered with one configured `<Say>` voice.
#[derive(Clone, Debug)]
pub struct VoiceResponses {
    voice: String,
}

impl Default for VoiceResponses {
    fn default() -> Self {
        Self::new(DEFAULT_SAY_VOICE)
    }
}

impl VoiceResponses {
    pub fn new(voice: impl Into<String>) -> Self {
        Self { voice: voice.into() }
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn welcome(&self, message: &str) -> Twiml {
        Twiml::new().say(&self.voice, message).record()
    }

    pub fn agent_response(&self, message: &str) -> Twiml {
        Twiml::new().say(&self.voice, clean_for_speech(message)).record()
    }

    pub fn goodbye(&self, message: &str) -> Twiml {
        Twiml::new().say(&self.voice, message).hangup()
    }

    pub fn error(&self, message: Option<&str>) -> Twiml {
        Twiml::new().say(&self.voice, message.unwrap_or(TECHNICAL_DIFFICULTIES)).hangup()
    }

    pub fn fallback(&self, message: &str) -> Twiml {
        Twiml::new().say(&self.voice, message).record()
    }

    pub fn gather_digits(&self, message: &str, num_digits: u32, finish_on_key: &str) -> Twiml {
        Twiml::new()
            .verb(Verb::Gather {
                num_digits,
                finish_on_key: finish_on_key.to_owned(),
                action: DTMF_ACTION.to_owned(),
                method: "POST".to_owned(),
                prompt: vec![Verb::Say { voice: self.voice.clone(), text: message.to_owned() }],
            })
            .say(&self.voice, NO_INPUT_GOODBYE)
            .hangup()
    }
}

/// Strips markdown the LLM tends to emit and normalizes whitespace for speech synthesis.
pub fn clean_for_speech(message: &str) -> String {
    let replaced = message.replace('&', "and");
    let stripped: String =
        replaced.chars().filter(|ch| !matches!(ch, '*' | '_' | '#' | '`')).collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::{clean_for_speech, escape_xml, Twiml, Verb, VoiceResponses};

    const WELCOME: &str =
        "Thank you for calling Taste of India. This is Priya. How may I assist you today?";

    #[test]
    fn welcome_says_then_records() {
        let xml = VoiceResponses::default().welcome(WELCOME).render();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#));
        assert!(xml.contains(
            r#"<Say voice="Polly.Joanna-Neural">Thank you for calling Taste of India. This is Priya. How may I assist you today?</Say>"#
        ));
        assert!(xml.contains(r#"<Record action="/webhook/transcribe" maxLength="60" playBeep="true"/>"#));
        assert!(xml.ends_with("</Response>"));
    }

    #[test]
    fn speech_cleaning_strips_markdown_and_ampersands() {
        assert_eq!(
            clean_for_speech("Try *Butter* Chicken & Naan  #1"),
            "Try Butter Chicken and Naan 1"
        );
        assert_eq!(clean_for_speech("  `gluten_free`\n\toptions "), "glutenfree options");
    }

    #[test]
    fn agent_text_is_cleaned_and_escaped() {
        let xml = VoiceResponses::default().agent_response("Tea & <biscuits>").render();
        assert!(xml.contains(">Tea and &lt;biscuits&gt;</Say>"));
    }

    #[test]
    fn goodbye_and_error_hang_up() {
        let responses = VoiceResponses::new("alice");
        let goodbye = responses.goodbye("Goodbye!");
        assert_eq!(goodbye.verbs().last(), Some(&Verb::Hangup));
        assert!(goodbye.render().contains(r#"<Say voice="alice">Goodbye!</Say>"#));

        let error = responses.error(None).render();
        assert!(error.contains("technical difficulties"));
        assert!(error.contains("<Hangup/>"));

        let custom = responses.error(Some("Line is busy.")).render();
        assert!(custom.contains(">Line is busy.</Say>"));
    }

    #[test]
    fn gather_wraps_prompt_and_falls_through_to_goodbye() {
        let xml = VoiceResponses::default().gather_digits("Press 1 for hours.", 1, "#").render();

        assert!(xml.contains(
            r##"<Gather numDigits="1" finishOnKey="#" action="/webhook/dtmf" method="POST"><Say voice="Polly.Joanna-Neural">Press 1 for hours.</Say></Gather>"##
        ));
        assert!(xml.contains("We didn't receive any input. Goodbye!"));
        assert!(xml.ends_with("<Hangup/></Response>"));
    }

    #[test]
    fn pause_renders_length() {
        let xml = Twiml::new().pause(2).hangup().render();
        assert!(xml.contains(r#"<Pause length="2"/><Hangup/>"#));
    }

    #[test]
    fn escaping_covers_attribute_quotes() {
        assert_eq!(escape_xml(r#"a "b" & 'c'"#), "a &quot;b&quot; &amp; 'c'");
    }
}
