//! Historical personas and the built-in roster.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Presentation hints for a persona room. Opaque to the session core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaTheme {
    pub primary_color: String,
    pub gradient: String,
    pub particle_color: String,
    pub font: String,
    pub border_style: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub era: String,
    #[serde(default)]
    pub bio: String,
    pub voice_id: String,
    /// Character instructions handed to the reply fetcher.
    pub instructions: String,
    pub greeting: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub theme: PersonaTheme,
}

impl Persona {
    /// Short description used for portrait prompts.
    pub fn description(&self) -> String {
        match (self.role.is_empty(), self.era.is_empty()) {
            (false, false) => format!("{} ({})", self.role, self.era),
            (false, true) => self.role.clone(),
            (true, false) => self.era.clone(),
            (true, true) => self.bio.clone(),
        }
    }
}

/// An ordered, read-only set of personas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonaRoster {
    personas: Vec<Persona>,
}

impl PersonaRoster {
    pub fn new(personas: Vec<Persona>) -> Self {
        Self { personas }
    }

    /// The four personas shipped with TimeDial.
    pub fn builtin() -> Self {
        Self::new(vec![
            einstein(),
            cleopatra(),
            da_vinci(),
            lovelace(),
        ])
    }

    pub fn find(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.iter()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    /// Ids that appear more than once, in first-seen order.
    pub fn duplicate_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut dups = Vec::new();
        for p in &self.personas {
            if !seen.insert(p.id.as_str()) && !dups.contains(&p.id) {
                dups.push(p.id.clone());
            }
        }
        dups
    }
}

fn einstein() -> Persona {
    Persona {
        id: "einstein".into(),
        name: "Albert Einstein".into(),
        role: "Theoretical Physicist".into(),
        era: "1879 – 1955".into(),
        bio: "Theoretical physicist and Nobel Prize winner. The mind behind Relativity.".into(),
        voice_id: "ozS9N1i8sNqA3YvH014P".into(),
        instructions: "You are Albert Einstein. Speak with wisdom, curiosity, and a slight German \
                       accent in your text phrasing. Explain complex physics simply."
            .into(),
        greeting: "Ah, a visitor! Time is relative, but I am glad ours has crossed. What puzzles you today?"
            .into(),
        avatar_url: "https://upload.wikimedia.org/wikipedia/commons/thumb/3/3e/Einstein_1921_by_F_Schmutzer_-_restoration.jpg/800px-Einstein_1921_by_F_Schmutzer_-_restoration.jpg".into(),
        theme: PersonaTheme {
            primary_color: "text-blue-300".into(),
            gradient: "from-blue-900/30 via-slate-950 to-black".into(),
            particle_color: "#93c5fd".into(),
            font: "font-serif".into(),
            border_style: "border-blue-500/30".into(),
        },
    }
}

fn cleopatra() -> Persona {
    Persona {
        id: "cleopatra".into(),
        name: "Cleopatra VII".into(),
        role: "Pharaoh of Egypt".into(),
        era: "69 – 30 BC".into(),
        bio: "Last active ruler of the Ptolemaic Kingdom. Diplomat, linguist, strategist.".into(),
        voice_id: "XB0fDUnXU5powFXDhCwa".into(),
        instructions: "You are Cleopatra VII, Pharaoh of Egypt. You speak with regal confidence, \
                       political cunning, and warmth toward those who earn your favor."
            .into(),
        greeting: "You stand before the Queen of the Nile. Speak, and choose your words wisely."
            .into(),
        avatar_url: String::new(),
        theme: PersonaTheme {
            primary_color: "text-amber-400".into(),
            gradient: "from-amber-900/30 via-stone-950 to-black".into(),
            particle_color: "#fbbf24".into(),
            font: "font-serif".into(),
            border_style: "border-amber-500/40".into(),
        },
    }
}

fn da_vinci() -> Persona {
    Persona {
        id: "da_vinci".into(),
        name: "Leonardo da Vinci".into(),
        role: "Polymath".into(),
        era: "1452 – 1519".into(),
        bio: "Painter, engineer, scientist.".into(),
        voice_id: "TxGEqnSnt8f3vAnI0v90".into(),
        instructions: "You are Leonardo da Vinci. You are obsessed with observation. \
                       You speak with artistic flair."
            .into(),
        greeting: "Ah, welcome. I was just sketching the flight of birds. Tell me, what do you wish to create?"
            .into(),
        avatar_url: "https://upload.wikimedia.org/wikipedia/commons/thumb/f/f7/Francesco_Melzi_-_Portrait_of_Leonardo_-_WGA14795.jpg/509px-Francesco_Melzi_-_Portrait_of_Leonardo_-_WGA14795.jpg".into(),
        theme: PersonaTheme {
            primary_color: "text-orange-300".into(),
            gradient: "from-orange-900/30 via-[#1c1917] to-black".into(),
            particle_color: "#fdba74".into(),
            font: "font-serif".into(),
            border_style: "border-orange-500/30".into(),
        },
    }
}

fn lovelace() -> Persona {
    Persona {
        id: "lovelace".into(),
        name: "Ada Lovelace".into(),
        role: "First Programmer".into(),
        era: "1815 – 1852".into(),
        bio: "Mathematician & Visionary.".into(),
        voice_id: "EXAVITQu4vr4xnSDxMaL".into(),
        instructions: "You are Ada Lovelace. You speak with poetic science. \
                       You are visionary and precise."
            .into(),
        greeting: "The Analytical Engine of my mind is whirring. Shall we compute something beautiful together?"
            .into(),
        avatar_url: "https://upload.wikimedia.org/wikipedia/commons/thumb/a/a4/Ada_Lovelace_portrait.jpg/400px-Ada_Lovelace_portrait.jpg".into(),
        theme: PersonaTheme {
            primary_color: "text-cyan-400".into(),
            gradient: "from-cyan-900/30 via-slate-950 to-black".into(),
            particle_color: "#22d3ee".into(),
            font: "font-mono".into(),
            border_style: "border-cyan-500/40".into(),
        },
    }
}
