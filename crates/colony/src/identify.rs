//! Heuristic species scoring from test outcomes, plate observations and
//! colony statistics. Scores are relative; nothing here is diagnostic.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::debug;

use crate::{
    tubes::{BiochemicalTest, TestOutcome},
    types::Colony,
};

/// Number of candidates returned by [`identify`].
pub const MAX_CANDIDATES: usize = 5;
/// Ceiling on panel match confidence.
pub const MAX_PANEL_CONFIDENCE: u32 = 95;

macro_rules! observation_enum {
    ($(#[$meta:meta])* $name:ident { $default:ident $(, $variant:ident)* $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash,
            Serialize, Deserialize, JsonSchema,
            Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
        )]
        #[serde(rename_all = "snake_case")]
        #[strum(serialize_all = "snake_case", ascii_case_insensitive)]
        pub enum $name {
            #[default]
            $default,
            $($variant,)*
        }
    };
}

observation_enum!(Elevation { Flat, Raised, Convex, Umbonate });
observation_enum!(Texture { Smooth, Rough, Mucoid, Powdery });
observation_enum!(Hemolysis { None, Alpha, Beta, Gamma });
observation_enum!(Pigmentation { None, White, Yellow, Orange, Red, Brown, Black, Green, Pigmented });
observation_enum!(
    /// Gram stain can come back variable, unlike the other tests.
    GramStain { Unknown, Positive, Negative, Variable }
);
observation_enum!(Fermentation { Unknown, Glucose, Lactose, Sucrose, None });

/// What the user saw on the plate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Observations {
    pub elevation: Elevation,
    pub texture: Texture,
    pub hemolysis: Hemolysis,
    pub pigmentation: Pigmentation,
    pub notes: String,
}

/// Bench test results entered by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct BiochemicalTests {
    pub gram_stain: GramStain,
    pub catalase: TestOutcome,
    pub coagulase: TestOutcome,
    pub oxidase: TestOutcome,
    pub motility: TestOutcome,
    pub spore_forming: TestOutcome,
    pub fermentation: Fermentation,
    pub voges_proskauer: TestOutcome,
    pub methyl_red: TestOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Candidate {
    pub name: String,
    /// Percent of the best raw score, 0..=100
    pub confidence: u32,
    pub reasons: Vec<String>,
}

/// Accumulates scores per name, remembering first-insertion order.
#[derive(Debug, Default)]
struct Scoreboard {
    entries: Vec<(&'static str, u32, Vec<&'static str>)>,
}

impl Scoreboard {
    fn add(&mut self, name: &'static str, score: u32, reason: &'static str) {
        match self.entries.iter_mut().find(|(n, ..)| *n == name) {
            Some((_, total, reasons)) => {
                *total += score;
                reasons.push(reason);
            }
            None => self.entries.push((name, score, vec![reason])),
        }
    }

    fn max_score(&self) -> u32 {
        self.entries.iter().map(|(_, s, _)| *s).max().unwrap_or(0)
    }
}

/// Rank candidate species. Empty evidence yields an empty list.
pub fn identify(colonies: &[Colony], observations: &Observations, tests: &BiochemicalTests) -> Vec<Candidate> {
    use TestOutcome::{Negative, Positive};

    let mut board = Scoreboard::default();

    match tests.gram_stain {
        GramStain::Positive => {
            if tests.catalase == Negative {
                board.add("Streptococcus", 15, "Gram+ Catalase-");
                match observations.hemolysis {
                    Hemolysis::Beta => board.add("Streptococcus pyogenes", 20, "Beta hemolysis"),
                    Hemolysis::Alpha => board.add("Streptococcus pneumoniae", 18, "Alpha hemolysis"),
                    _ => {}
                }
            }
            if tests.catalase == Positive {
                board.add("Staphylococcus", 20, "Gram+ Catalase+");
                if tests.coagulase == Positive {
                    board.add("Staphylococcus aureus", 25, "Coagulase+");
                    if matches!(observations.pigmentation, Pigmentation::Yellow | Pigmentation::Orange) {
                        board.add("Staphylococcus aureus", 10, "Yellow/orange pigmentation");
                    }
                } else if tests.coagulase == Negative {
                    board.add("Staphylococcus epidermidis", 20, "Coagulase-");
                }
            }
        }
        GramStain::Negative => {
            if tests.oxidase == Positive {
                board.add("Pseudomonas", 18, "Gram- Oxidase+");
                if observations.pigmentation == Pigmentation::Green {
                    board.add("Pseudomonas aeruginosa", 25, "Green pigmentation");
                }
            } else if tests.oxidase == Negative {
                board.add("Enterobacteriaceae", 15, "Gram- Oxidase-");
                if tests.methyl_red == Positive {
                    board.add("E. coli", 15, "Methyl Red+");
                    if tests.voges_proskauer == Negative {
                        board.add("E. coli", 10, "MR+/VP-");
                    }
                }
                if tests.voges_proskauer == Positive {
                    board.add("Klebsiella", 15, "VP+");
                }
            }
        }
        GramStain::Unknown | GramStain::Variable => {}
    }

    if tests.spore_forming == Positive && tests.gram_stain == GramStain::Positive {
        board.add("Bacillus", 25, "Spore-forming Gram+");
    }
    match tests.motility {
        Positive => board.add("E. coli", 10, "Motile"),
        Negative => board.add("Klebsiella", 10, "Non-motile"),
        TestOutcome::Unknown => {}
    }

    if !colonies.is_empty() {
        let n = colonies.len() as f64;
        let avg = colonies.iter().map(|c| c.size_px as f64).sum::<f64>() / n;
        let small = colonies.iter().filter(|c| (c.size_px as f64) < avg / 2.0).count() as f64 > n / 2.0;
        let large = colonies.iter().any(|c| c.size_px as f64 > avg * 2.0);
        if small {
            board.add("Streptococcus", 8, "Small colonies");
        }
        if large {
            board.add("Bacillus", 8, "Large colonies");
        }
        let translucent = colonies.iter().any(|c| {
            let [r, g, b] = c.color();
            r.max(g).max(b) > 200 && r.min(g).min(b) > 180
        });
        if translucent {
            board.add("Streptococcus pneumoniae", 8, "Translucent colonies");
        }
    }

    if observations.texture == Texture::Mucoid {
        board.add("Klebsiella", 12, "Mucoid texture");
        board.add("Pseudomonas aeruginosa", 8, "Mucoid growth");
    }
    if tests.fermentation == Fermentation::Glucose {
        board.add("E. coli", 8, "Glucose fermentation");
    }

    let max_score = board.max_score().max(1) as f64;
    let mut candidates: Vec<Candidate> = board
        .entries
        .into_iter()
        .map(|(name, score, reasons)| Candidate {
            name: name.to_string(),
            confidence: (score as f64 / max_score * 100.0).round() as u32,
            reasons: reasons.into_iter().map(String::from).collect(),
        })
        .collect();
    // stable: ties keep insertion order
    candidates.sort_by(|a, b| b.confidence.cmp(&a.confidence));
    candidates.truncate(MAX_CANDIDATES);

    debug!(candidates = candidates.len(), "identification scored");
    candidates
}

/// Outcomes for the eight reference-palette tubes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TestPanel {
    pub gram_stain: TestOutcome,
    pub catalase: TestOutcome,
    pub oxidase: TestOutcome,
    pub coagulase: TestOutcome,
    pub indole: TestOutcome,
    pub citrate: TestOutcome,
    pub urease: TestOutcome,
    pub lactose_fermentation: TestOutcome,
}

impl TestPanel {
    pub fn get(&self, test: BiochemicalTest) -> TestOutcome {
        match test {
            BiochemicalTest::GramStain => self.gram_stain,
            BiochemicalTest::Catalase => self.catalase,
            BiochemicalTest::Oxidase => self.oxidase,
            BiochemicalTest::Coagulase => self.coagulase,
            BiochemicalTest::Indole => self.indole,
            BiochemicalTest::Citrate => self.citrate,
            BiochemicalTest::Urease => self.urease,
            BiochemicalTest::LactoseFermentation => self.lactose_fermentation,
        }
    }

    pub fn set(&mut self, test: BiochemicalTest, outcome: TestOutcome) {
        let slot = match test {
            BiochemicalTest::GramStain => &mut self.gram_stain,
            BiochemicalTest::Catalase => &mut self.catalase,
            BiochemicalTest::Oxidase => &mut self.oxidase,
            BiochemicalTest::Coagulase => &mut self.coagulase,
            BiochemicalTest::Indole => &mut self.indole,
            BiochemicalTest::Citrate => &mut self.citrate,
            BiochemicalTest::Urease => &mut self.urease,
            BiochemicalTest::LactoseFermentation => &mut self.lactose_fermentation,
        };
        *slot = outcome;
    }
}

/// Reference card for a species the panel scorer can name.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct SpeciesProfile {
    pub key: &'static str,
    pub name: &'static str,
    pub characteristics: &'static [&'static str],
    pub explanation: &'static str,
    pub common_in: &'static str,
}

pub const SPECIES: &[SpeciesProfile] = &[
    SpeciesProfile {
        key: "Staphylococcus aureus",
        name: "Staphylococcus aureus",
        characteristics: &["Gram+", "Catalase+", "Coagulase+", "Golden colonies"],
        explanation: "Gram-positive cocci, catalase and coagulase positive. Common food poisoning pathogen.",
        common_in: "Dairy, cheese, processed foods, skin infections",
    },
    SpeciesProfile {
        key: "E. coli",
        name: "Escherichia coli",
        characteristics: &["Gram-", "Oxidase-", "Indole+", "Lactose+"],
        explanation: "Gram-negative rod, oxidase negative, indole positive. Common in food and water.",
        common_in: "Water, dairy, meat, fecal samples",
    },
    SpeciesProfile {
        key: "Salmonella",
        name: "Salmonella species",
        characteristics: &["Gram-", "Catalase+", "Citrate+", "No lactose fermentation"],
        explanation: "Gram-negative rod, catalase positive, citrate positive, no lactose fermentation.",
        common_in: "Meat, poultry, eggs, food poisoning",
    },
    SpeciesProfile {
        key: "Listeria monocytogenes",
        name: "Listeria monocytogenes",
        characteristics: &["Gram+", "Catalase+", "Coagulase-", "β-hemolytic"],
        explanation: "Gram-positive rod, catalase positive, coagulase negative. Important dairy pathogen.",
        common_in: "Dairy, meat, fermented foods",
    },
    SpeciesProfile {
        key: "Pseudomonas aeruginosa",
        name: "Pseudomonas aeruginosa",
        characteristics: &["Gram-", "Oxidase+", "Green pigment", "Non-fermenting"],
        explanation: "Gram-negative rod, oxidase positive. Often produces green-blue pigment.",
        common_in: "Water, soil, environmental samples",
    },
    SpeciesProfile {
        key: "Lactobacillus",
        name: "Lactobacillus species",
        characteristics: &["Gram+", "Catalase-", "Lactose+", "Homofermentative"],
        explanation: "Gram-positive rod, catalase negative. Essential in fermentation.",
        common_in: "Fermented dairy, yogurt, kimchi",
    },
];

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct PanelMatch {
    pub species: &'static SpeciesProfile,
    pub confidence: u32,
}

/// `(test, outcome that scores, species key, weight)`
const PANEL_WEIGHTS: &[(BiochemicalTest, TestOutcome, &str, u32)] = {
    use BiochemicalTest::*;
    use TestOutcome::{Negative as Neg, Positive as Pos};
    &[
        (GramStain, Pos, "Staphylococcus aureus", 30),
        (Catalase, Pos, "Staphylococcus aureus", 25),
        (Coagulase, Pos, "Staphylococcus aureus", 35),
        (GramStain, Neg, "E. coli", 20),
        (Oxidase, Neg, "E. coli", 20),
        (Indole, Pos, "E. coli", 30),
        (LactoseFermentation, Pos, "E. coli", 30),
        (GramStain, Neg, "Salmonella", 20),
        (Catalase, Pos, "Salmonella", 20),
        (Citrate, Pos, "Salmonella", 35),
        (LactoseFermentation, Neg, "Salmonella", 25),
        (GramStain, Pos, "Listeria monocytogenes", 25),
        (Catalase, Pos, "Listeria monocytogenes", 25),
        (Coagulase, Neg, "Listeria monocytogenes", 40),
        (GramStain, Neg, "Pseudomonas aeruginosa", 25),
        (Oxidase, Pos, "Pseudomonas aeruginosa", 50),
        (GramStain, Pos, "Lactobacillus", 20),
        (Catalase, Neg, "Lactobacillus", 25),
        (LactoseFermentation, Pos, "Lactobacillus", 35),
    ]
};

/// Best single species for a tube panel. The first species to reach the
/// top score wins; `None` when no outcome scores anything.
pub fn identify_from_panel(panel: &TestPanel) -> Option<PanelMatch> {
    let mut board = Scoreboard::default();
    for &(test, scoring_outcome, key, weight) in PANEL_WEIGHTS {
        if panel.get(test) == scoring_outcome {
            board.add(key, weight, test.short_name());
        }
    }

    let max = board.max_score();
    let (key, ..) = board.entries.iter().find(|(_, score, _)| *score == max)?;
    let species = SPECIES.iter().find(|s| s.key == *key)?;
    Some(PanelMatch {
        species,
        confidence: max.min(MAX_PANEL_CONFIDENCE),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::BlobFeatures;

    fn create_colony(id: u32, size: u32, color: [u8; 3]) -> Colony {
        BlobFeatures {
            size,
            centroid_x: 0.0,
            centroid_y: 0.0,
            min_x: 0,
            max_x: 9,
            min_y: 0,
            max_y: 9,
            width: 10,
            height: 10,
            perimeter: 40,
            circularity: 0.8,
            density: 0.9,
            color,
        }
        .into_colony(id)
    }

    #[test]
    fn test_staphylococcus_aureus_leads() {
        let tests = BiochemicalTests {
            gram_stain: GramStain::Positive,
            catalase: TestOutcome::Positive,
            coagulase: TestOutcome::Positive,
            ..Default::default()
        };
        let observations = Observations {
            pigmentation: Pigmentation::Yellow,
            ..Default::default()
        };
        let candidates = identify(&[], &observations, &tests);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].name, "Staphylococcus aureus");
        assert_eq!(candidates[0].confidence, 100);
        assert_eq!(candidates[0].reasons, vec!["Coagulase+", "Yellow/orange pigmentation"]);
        assert_eq!(candidates[1].name, "Staphylococcus");
        // 20 / 35
        assert_eq!(candidates[1].confidence, 57);
    }

    #[test]
    fn test_no_evidence_is_empty() {
        assert!(identify(&[], &Observations::default(), &BiochemicalTests::default()).is_empty());
    }

    #[test]
    fn test_colony_statistics_and_tie_order() {
        let colonies = vec![
            create_colony(1, 10, [0, 0, 0]),
            create_colony(2, 10, [0, 0, 0]),
            create_colony(3, 10, [0, 0, 0]),
            create_colony(4, 100, [0, 0, 0]),
        ];
        let candidates = identify(&colonies, &Observations::default(), &BiochemicalTests::default());
        let names: Vec<_> = candidates.iter().map(|c| (c.name.as_str(), c.confidence)).collect();
        assert_eq!(names, vec![("Streptococcus", 100), ("Bacillus", 100)]);
    }

    #[test]
    fn test_translucent_colonies() {
        let colonies = vec![create_colony(1, 50, [230, 220, 190])];
        let candidates = identify(&colonies, &Observations::default(), &BiochemicalTests::default());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Streptococcus pneumoniae");
        assert_eq!(candidates[0].reasons, vec!["Translucent colonies"]);
    }

    #[test]
    fn test_enteric_rules_and_truncation() {
        let tests = BiochemicalTests {
            gram_stain: GramStain::Negative,
            oxidase: TestOutcome::Negative,
            methyl_red: TestOutcome::Positive,
            voges_proskauer: TestOutcome::Negative,
            motility: TestOutcome::Positive,
            fermentation: Fermentation::Glucose,
            ..Default::default()
        };
        let observations = Observations {
            texture: Texture::Mucoid,
            ..Default::default()
        };
        let colonies = vec![
            create_colony(1, 40, [240, 240, 240]),
            create_colony(2, 40, [0, 0, 0]),
            create_colony(3, 40, [0, 0, 0]),
            create_colony(4, 300, [0, 0, 0]),
        ];
        let candidates = identify(&colonies, &observations, &tests);

        // E. coli 15+10+10+8 = 43 leads; seven names scored, five kept
        assert_eq!(candidates.len(), MAX_CANDIDATES);
        assert_eq!(candidates[0].name, "E. coli");
        assert_eq!(candidates[0].confidence, 100);
        assert!(candidates.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn test_panel_staphylococcus() {
        let mut panel = TestPanel::default();
        panel.set(BiochemicalTest::GramStain, TestOutcome::Positive);
        panel.set(BiochemicalTest::Catalase, TestOutcome::Positive);
        panel.set(BiochemicalTest::Coagulase, TestOutcome::Positive);

        let found = identify_from_panel(&panel).expect("Should match a species");
        assert_eq!(found.species.name, "Staphylococcus aureus");
        assert_eq!(found.confidence, 90);
    }

    #[test]
    fn test_panel_confidence_is_capped() {
        let panel = TestPanel {
            gram_stain: TestOutcome::Negative,
            oxidase: TestOutcome::Negative,
            indole: TestOutcome::Positive,
            lactose_fermentation: TestOutcome::Positive,
            ..Default::default()
        };
        let found = identify_from_panel(&panel).expect("Should match a species");
        assert_eq!(found.species.name, "Escherichia coli");
        assert_eq!(found.confidence, MAX_PANEL_CONFIDENCE);
    }

    #[test]
    fn test_panel_tie_goes_to_first_scored() {
        // Gram- alone: E. coli 20, Salmonella 20, Pseudomonas 25
        let panel = TestPanel {
            gram_stain: TestOutcome::Negative,
            ..Default::default()
        };
        assert_eq!(
            identify_from_panel(&panel).map(|m| m.species.key),
            Some("Pseudomonas aeruginosa")
        );

        // Catalase+ alone: S. aureus 25, Salmonella 20, Listeria 25
        let panel = TestPanel {
            catalase: TestOutcome::Positive,
            ..Default::default()
        };
        assert_eq!(
            identify_from_panel(&panel).map(|m| m.species.key),
            Some("Staphylococcus aureus")
        );
    }

    #[test]
    fn test_empty_panel() {
        assert_eq!(identify_from_panel(&TestPanel::default()), None);
    }
}
