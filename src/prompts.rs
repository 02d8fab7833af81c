//! Prompt text sent to the image providers.
//!
//! The form fields arrive as free text. They are parsed into closed enums at
//! the HTTP boundary; anything that doesn't match a known key is kept as
//! [`Choice::Unknown`] so it can be logged, and contributes nothing to the
//! prompt.

use std::fmt::Display;
use std::str::FromStr;

use tracing::warn;

/// Start of every prompt.
pub const PROMPT_BASE: &str = "Same dog from the photo, photorealistic, soft natural lighting, \
     keeping its breed, markings and expression";

/// Background and mood for the generated photo.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// Sunlit living room, lemon tones
    LemonFreshMorning,
    /// Warm plant-filled bedroom
    LavenderChillEvening,
    /// Open grassy field
    OrangeGroveAdventure,
    /// Bright couch, summer feel
    GrapefruitGetaway,
    /// Plush couch, warm wood
    MahoganyCoconutLounge,
}

impl Scenario {
    /// Every scenario, in display order.
    pub const ALL: [Scenario; 5] = [
        Scenario::LemonFreshMorning,
        Scenario::LavenderChillEvening,
        Scenario::OrangeGroveAdventure,
        Scenario::GrapefruitGetaway,
        Scenario::MahoganyCoconutLounge,
    ];

    /// Name as shown to users and sent by the frontend.
    pub fn label(self) -> &'static str {
        match self {
            Scenario::LemonFreshMorning => "Lemon Fresh Morning",
            Scenario::LavenderChillEvening => "Lavender Chill Evening",
            Scenario::OrangeGroveAdventure => "Orange Grove Adventure",
            Scenario::GrapefruitGetaway => "Grapefruit Getaway",
            Scenario::MahoganyCoconutLounge => "Mahogany Coconut Lounge",
        }
    }

    /// Scene clause appended to the prompt.
    pub fn description(self) -> &'static str {
        match self {
            Scenario::LemonFreshMorning => {
                "sitting on a clean carpet in a bright, sunlit living room with soft tones, \
                 a green GNB tag and green houseplants"
            }
            Scenario::LavenderChillEvening => {
                "lying on a soft rug in a warm, plant-filled bedroom with a green GNB patch, \
                 gentle lighting and natural textures"
            }
            Scenario::OrangeGroveAdventure => {
                "standing in a grassy open field with a citrus icon and green GNB label, \
                 soft light and distant trees"
            }
            Scenario::GrapefruitGetaway => {
                "lounging on a bright couch with a green GNB collar tag, surrounded by indoor \
                 plants and sheer curtains in a relaxed room"
            }
            Scenario::MahoganyCoconutLounge => {
                "resting on a plush couch with soft pillows, a green GNB patch and warm wood \
                 textures under ambient light"
            }
        }
    }
}

/// Outfit the pet is dressed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Clothing {
    /// Pastel hoodie
    Hoodie,
    /// Knitted poncho
    Poncho,
    /// Neck bandana
    Bandana,
    /// Cable-knit sweater
    Sweater,
    /// Wool scarf
    Scarf,
    /// Rain jacket
    Raincoat,
}

impl Clothing {
    /// Every clothing option, in display order.
    pub const ALL: [Clothing; 6] = [
        Clothing::Hoodie,
        Clothing::Poncho,
        Clothing::Bandana,
        Clothing::Sweater,
        Clothing::Scarf,
        Clothing::Raincoat,
    ];

    /// Name as shown to users and sent by the frontend.
    pub fn label(self) -> &'static str {
        match self {
            Clothing::Hoodie => "Hoodie",
            Clothing::Poncho => "Poncho",
            Clothing::Bandana => "Bandana",
            Clothing::Sweater => "Sweater",
            Clothing::Scarf => "Scarf",
            Clothing::Raincoat => "Raincoat",
        }
    }

    /// Outfit clause appended to the prompt.
    pub fn description(self) -> &'static str {
        match self {
            Clothing::Hoodie => "a cozy pastel yellow hoodie with a small lemon icon",
            Clothing::Poncho => "a soft knitted poncho in lavender and cream stripes",
            Clothing::Bandana => "an orange bandana with a citrus print",
            Clothing::Sweater => "a chunky cable-knit sweater in warm brown",
            Clothing::Scarf => "a loosely wrapped pink wool scarf",
            Clothing::Raincoat => "a bright green raincoat with the hood down",
        }
    }
}

/// A form value isn't one of the known keys.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown option {0:?}")]
pub struct UnknownOption(pub String);

fn match_label<T: Copy>(options: &[T], label: impl Fn(T) -> &'static str, value: &str) -> Option<T> {
    let value = value.trim();
    options
        .iter()
        .copied()
        .find(|option| label(*option).eq_ignore_ascii_case(value))
}

impl FromStr for Scenario {
    type Err = UnknownOption;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match_label(&Self::ALL, Self::label, value).ok_or_else(|| UnknownOption(value.to_string()))
    }
}

impl FromStr for Clothing {
    type Err = UnknownOption;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match_label(&Self::ALL, Self::label, value).ok_or_else(|| UnknownOption(value.to_string()))
    }
}

/// A selection that may be missing or unrecognised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Choice<T> {
    /// The field wasn't sent, or was blank
    Unset,
    /// A recognised key
    Known(T),
    /// Something we don't have a description for
    Unknown(String),
}

impl<T> Default for Choice<T> {
    fn default() -> Self {
        Choice::Unset
    }
}

impl<T: FromStr> Choice<T> {
    /// Parses an optional form value. Blank values count as unset.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Choice::Unset,
            Some(value) => match value.parse() {
                Ok(known) => Choice::Known(known),
                Err(_) => Choice::Unknown(value.to_string()),
            },
        }
    }
}

impl<T: Copy> Choice<T> {
    /// The recognised value, if any.
    pub fn known(&self) -> Option<T> {
        match self {
            Choice::Known(value) => Some(*value),
            Choice::Unset | Choice::Unknown(_) => None,
        }
    }
}

/// What the caller asked the pet to wear and where.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PromptSelection {
    /// Scene choice
    pub scenario: Choice<Scenario>,
    /// Outfit choice
    pub clothing: Choice<Clothing>,
}

impl PromptSelection {
    /// Builds a selection from raw form values.
    pub fn from_form(scenario: Option<&str>, clothing: Option<&str>) -> Self {
        let selection = Self {
            scenario: Choice::parse(scenario),
            clothing: Choice::parse(clothing),
        };
        selection.warn_unknown();
        selection
    }

    fn warn_unknown(&self) {
        fn check<T>(field: &str, choice: &Choice<T>) {
            if let Choice::Unknown(value) = choice {
                warn!("Ignoring unknown {field} {value:?}");
            }
        }
        check("scenario", &self.scenario);
        check("clothing", &self.clothing);
    }
}

impl Display for PromptSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scenario = self.scenario.known().map(Scenario::label).unwrap_or("-");
        let clothing = self.clothing.known().map(Clothing::label).unwrap_or("-");
        write!(f, "scenario={scenario} clothing={clothing}")
    }
}

/// Composes the prompt for a selection. Unset or unknown choices are left out.
pub fn build_prompt(selection: &PromptSelection) -> String {
    let mut prompt = String::from(PROMPT_BASE);
    if let Some(clothing) = selection.clothing.known() {
        prompt.push_str(", wearing ");
        prompt.push_str(clothing.description());
    }
    if let Some(scenario) = selection.scenario.known() {
        prompt.push_str(". Scene: ");
        prompt.push_str(scenario.description());
    }
    prompt.push('.');
    prompt
}
