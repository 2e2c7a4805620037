//! Turn-by-turn guidance generation.
//!
//! Converts a route step plus the remaining distance into a phrase the
//! presentation layer can show or speak, and decides when a phrase is
//! worth (re-)announcing. Phrases are data: a [`PhraseSet`] holds every
//! template, so another language plugs in as a deserialized value rather
//! than new code.

use crate::config::InstructionConfig;
use crate::route::{ManeuverType, RouteStep};
use serde::{Deserialize, Serialize};

/// How soon the maneuver is coming up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionTiming {
    /// Maneuver point is right here.
    Immediate,
    /// Close enough to prepare.
    Near,
    Normal,
}

impl InstructionTiming {
    fn from_distance(distance_m: f64, config: &InstructionConfig) -> Self {
        if distance_m < config.immediate_distance_m {
            InstructionTiming::Immediate
        } else if distance_m < config.near_distance_m {
            InstructionTiming::Near
        } else {
            InstructionTiming::Normal
        }
    }
}

/// One guidance utterance, ready for display or speech.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavigationInstruction {
    pub maneuver: ManeuverType,
    /// Full phrase, e.g. "Turn right onto Market Street in 200 m".
    pub text: String,
    /// Just the distance part, e.g. "200 m".
    pub distance_text: String,
    pub distance_m: f64,
    /// Tag the presentation layer maps to an arrow glyph.
    pub icon: String,
    /// Set by the session when the instruction is announced rather than
    /// silently refreshed.
    pub spoken: bool,
    pub timing: InstructionTiming,
}

/// Phrase templates for one language. Defaults are English.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhraseSet {
    pub depart: String,
    pub straight: String,
    pub slight_left: String,
    pub slight_right: String,
    pub turn_left: String,
    pub turn_right: String,
    pub sharp_left: String,
    pub sharp_right: String,
    pub u_turn: String,
    pub roundabout_enter: String,
    pub roundabout_exit: String,
    pub arrive: String,
    /// Replaces the distance when the maneuver is immediate, e.g. "now".
    pub immediate: String,
    /// Joins phrase and distance, e.g. "in".
    pub distance_link: String,
    /// Joins phrase and road name, e.g. "onto".
    pub name_link: String,
}

impl Default for PhraseSet {
    fn default() -> Self {
        PhraseSet {
            depart: "Head out".to_string(),
            straight: "Continue straight".to_string(),
            slight_left: "Bear left".to_string(),
            slight_right: "Bear right".to_string(),
            turn_left: "Turn left".to_string(),
            turn_right: "Turn right".to_string(),
            sharp_left: "Turn sharp left".to_string(),
            sharp_right: "Turn sharp right".to_string(),
            u_turn: "Make a U-turn".to_string(),
            roundabout_enter: "Enter the roundabout".to_string(),
            roundabout_exit: "Exit the roundabout".to_string(),
            arrive: "Arrive at your destination".to_string(),
            immediate: "now".to_string(),
            distance_link: "in".to_string(),
            name_link: "onto".to_string(),
        }
    }
}

impl PhraseSet {
    fn for_maneuver(&self, maneuver: ManeuverType) -> &str {
        match maneuver {
            ManeuverType::Depart => &self.depart,
            ManeuverType::Straight => &self.straight,
            ManeuverType::SlightLeft => &self.slight_left,
            ManeuverType::SlightRight => &self.slight_right,
            ManeuverType::TurnLeft => &self.turn_left,
            ManeuverType::TurnRight => &self.turn_right,
            ManeuverType::SharpLeft => &self.sharp_left,
            ManeuverType::SharpRight => &self.sharp_right,
            ManeuverType::UTurn => &self.u_turn,
            ManeuverType::RoundaboutEnter => &self.roundabout_enter,
            ManeuverType::RoundaboutExit => &self.roundabout_exit,
            ManeuverType::Arrive => &self.arrive,
        }
    }
}

/// Builds instructions and decides announcement timing for one session.
pub struct InstructionGenerator {
    config: InstructionConfig,
    phrases: PhraseSet,
}

impl InstructionGenerator {
    pub fn new(config: InstructionConfig) -> Self {
        Self::with_phrases(config, PhraseSet::default())
    }

    pub fn with_phrases(config: InstructionConfig, phrases: PhraseSet) -> Self {
        InstructionGenerator { config, phrases }
    }

    /// Human-readable distance: the immediate phrase under the immediate
    /// threshold, meters rounded to the nearest 10 under a kilometer,
    /// one-decimal kilometers above.
    pub fn format_distance(&self, meters: f64) -> String {
        if meters < self.config.immediate_distance_m {
            self.phrases.immediate.clone()
        } else if meters < 1000.0 {
            format!("{} m", ((meters / 10.0).round() * 10.0) as i64)
        } else {
            format!("{:.1} km", meters / 1000.0)
        }
    }

    /// Build the instruction for a step with `distance_m` left to its
    /// maneuver point. Provider-supplied text on the step wins over the
    /// generated phrase; the icon and timing are attached either way.
    pub fn build(&self, step: &RouteStep, distance_m: f64) -> NavigationInstruction {
        let timing = InstructionTiming::from_distance(distance_m, &self.config);
        let distance_text = self.format_distance(distance_m);

        let text = match &step.instruction {
            Some(provided) => provided.clone(),
            None => {
                let mut text = self.phrases.for_maneuver(step.maneuver).to_string();
                if let Some(name) = &step.name {
                    text.push(' ');
                    text.push_str(&self.phrases.name_link);
                    text.push(' ');
                    text.push_str(name);
                }
                if timing == InstructionTiming::Immediate {
                    text.push(' ');
                    text.push_str(&distance_text);
                } else {
                    text.push(' ');
                    text.push_str(&self.phrases.distance_link);
                    text.push(' ');
                    text.push_str(&distance_text);
                }
                text
            }
        };

        NavigationInstruction {
            maneuver: step.maneuver,
            text,
            distance_text,
            distance_m,
            icon: step.maneuver.icon_tag().to_string(),
            spoken: false,
            timing,
        }
    }

    /// Whether `candidate` deserves a fresh announcement.
    ///
    /// Announce when nothing was announced yet, when the maneuver type
    /// changed, or when the distance first crosses under the announce
    /// threshold. Repeated calls with no new crossing stay quiet.
    pub fn should_announce(
        &self,
        previous: Option<&NavigationInstruction>,
        candidate: &NavigationInstruction,
    ) -> bool {
        let previous = match previous {
            None => return true,
            Some(p) => p,
        };

        if previous.maneuver != candidate.maneuver {
            return true;
        }

        previous.distance_m > self.config.announce_threshold_m
            && candidate.distance_m <= self.config.announce_threshold_m
    }
}
