use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use tera::{Context, Tera};

use hostline_core::domain::restaurant::RestaurantProfile;

const SYSTEM_PROMPT: &str = "system_prompt.tera";
const WELCOME: &str = "welcome_message.tera";
const GOODBYE: &str = "goodbye_message.tera";
const FALLBACK: &str = "fallback_message.tera";

/// Rendered call scripts for one restaurant.
///
/// Welcome, goodbye and fallback lines are rendered once; the system prompt is rendered per
/// call because it carries the current date.
#[derive(Clone, Debug)]
pub struct PromptCatalog {
    tera: Tera,
    profile: RestaurantProfile,
    welcome: String,
    goodbye: String,
    fallback: String,
}

impl PromptCatalog {
    pub fn new(profile: RestaurantProfile) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (SYSTEM_PROMPT, include_str!("../../../templates/prompts/system_prompt.tera")),
            (WELCOME, include_str!("../../../templates/prompts/welcome_message.tera")),
            (GOODBYE, include_str!("../../../templates/prompts/goodbye_message.tera")),
            (FALLBACK, include_str!("../../../templates/prompts/fallback_message.tera")),
        ])
        .context("registering prompt templates")?;

        let context = profile_context(&profile);
        let render = |name: &str| {
            tera.render(name, &context)
                .map(|text| text.trim().to_owned())
                .with_context(|| format!("rendering {name}"))
        };
        let welcome = render(WELCOME)?;
        let goodbye = render(GOODBYE)?;
        let fallback = render(FALLBACK)?;

        Ok(Self { tera, profile, welcome, goodbye, fallback })
    }

    pub fn profile(&self) -> &RestaurantProfile {
        &self.profile
    }

    pub fn system_prompt(&self, today: NaiveDate) -> Result<String> {
        let mut context = profile_context(&self.profile);
        context.insert("today", &today.format("%A, %Y-%m-%d").to_string());
        let rendered = self.tera.render(SYSTEM_PROMPT, &context).context("rendering system prompt")?;
        Ok(rendered.trim().to_owned())
    }

    pub fn welcome(&self) -> &str {
        &self.welcome
    }

    pub fn goodbye(&self) -> &str {
        &self.goodbye
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }
}

fn profile_context(profile: &RestaurantProfile) -> Context {
    let mut context = Context::new();
    context.insert("restaurant", profile);
    context.insert("opening_hours", &profile.hours.label_12h());
    context
}
