use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ===== Rule Tables =====

// Injury descriptions matching any of these phrases warrant immediate
// critical weighting. Matching is case-insensitive substring containment.
const CRITICAL_INJURY_PATTERNS: &[&str] = &[
    "head injury",
    "brain injury",
    "skull fracture",
    "traumatic brain injury",
    "chest injury",
    "pneumothorax",
    "hemothorax",
    "flail chest",
    "abdominal injury",
    "internal bleeding",
    "abdominal trauma",
    "spinal injury",
    "spinal cord injury",
    "neck injury",
    "massive bleeding",
    "hemorrhage",
    "arterial bleeding",
    "amputation",
    "severed limb",
    "major amputation",
    "multiple fractures",
    "pelvic fracture",
    "femur fracture",
];

// High-energy mechanisms that increase expected injury severity.
const HIGH_ENERGY_MECHANISMS: &[&str] = &[
    "motor vehicle accident",
    "car accident",
    "motorcycle accident",
    "fall from height",
    "high speed collision",
    "rollover",
    "gunshot",
    "gsw",
    "shooting",
    "bullet wound",
    "stabbing",
    "knife wound",
    "penetrating trauma",
    "explosion",
    "blast injury",
    "crush injury",
    "hit by vehicle",
    "pedestrian struck",
];

const SEVERE_INJURY_KEYWORDS: &[&str] = &["fracture", "dislocation", "severe", "deep laceration"];

const UNRESPONSIVE_KEYWORDS: &[&str] = &["unconscious", "unresponsive", "coma"];
const ALTERED_KEYWORDS: &[&str] = &["confused", "disoriented", "altered"];
const DROWSY_KEYWORDS: &[&str] = &["drowsy", "lethargic"];

/// Injury sub-scores are capped here before the x1.5 weighting is applied.
const INJURY_SEVERITY_CAP: u32 = 25;

fn contains_any(text: &str, patterns: &[&str]) -> bool {
    let lower = text.to_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}

// ===== Triage Levels =====

/// Field-medicine priority category used to color-code patients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriageLevel {
    Red,
    Yellow,
    Green,
    Black,
}

impl TriageLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriageLevel::Red => "red",
            TriageLevel::Yellow => "yellow",
            TriageLevel::Green => "green",
            TriageLevel::Black => "black",
        }
    }

    /// Fixed level-to-status mapping shared by the service and any badge UI.
    pub fn status(&self) -> &'static str {
        match self {
            TriageLevel::Red => "Critical",
            TriageLevel::Yellow => "Stable",
            TriageLevel::Green => "Improving",
            TriageLevel::Black => "Deceased",
        }
    }

    /// Display label for triage badges.
    pub fn label(&self) -> &'static str {
        match self {
            TriageLevel::Red => "CRITICAL",
            TriageLevel::Yellow => "URGENT",
            TriageLevel::Green => "STABLE",
            TriageLevel::Black => "DECEASED",
        }
    }
}

impl fmt::Display for TriageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriageLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "red" => Ok(TriageLevel::Red),
            "yellow" => Ok(TriageLevel::Yellow),
            "green" => Ok(TriageLevel::Green),
            "black" => Ok(TriageLevel::Black),
            other => Err(format!("unknown triage level: {other}")),
        }
    }
}

// ===== Data Models =====

/// Everything known about a patient at classification time. Absent fields
/// mean "not observed" and contribute nothing to the score. Vitals recorded
/// as 0 are treated as absent as well, since field monitors report 0 when
/// they have no reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriageFactors {
    // Vital signs
    pub heart_rate: Option<f64>,
    #[serde(rename = "systolicBP")]
    pub systolic_bp: Option<f64>,
    #[serde(rename = "diastolicBP")]
    pub diastolic_bp: Option<f64>,
    pub respiratory_rate: Option<f64>,
    pub temperature: Option<f64>,
    pub oxygen_saturation: Option<f64>,

    // Questionnaire responses
    pub consciousness: Option<String>,
    pub mechanism: Option<String>,
    pub visible_injuries: bool,
    pub selected_injuries: Vec<String>,
    pub chief_complaint: Option<String>,

    // Interventions performed so far
    pub action_count: u32,
    pub emergency_action_count: u32,
    pub medication_count: u32,
}

/// Outcome of one classification pass. Produced fresh on every call and
/// never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageResult {
    pub level: TriageLevel,
    /// Weighted total across all sub-scores, rounded to one decimal.
    pub score: f64,
    /// One line per scoring rule that fired, critical overrides first.
    pub reasoning: Vec<String>,
    /// Enhanced shock index, present only when heart rate and systolic BP
    /// were both observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shock_index: Option<f64>,
    /// Injury-pattern sub-score alone, capped at 25.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injury_severity_score: Option<u32>,
}

struct ScoreBlock {
    score: u32,
    reasons: Vec<String>,
}

// ===== Classifier =====

/// Deterministic, side-effect-free mapping from [`TriageFactors`] to a
/// [`TriageResult`]. Stateless; safe to share and call concurrently.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriageClassifier;

impl TriageClassifier {
    pub fn new() -> Self {
        Self
    }

    // A vital recorded as 0 means the monitor had no reading.
    fn observed(value: Option<f64>) -> Option<f64> {
        value.filter(|v| *v != 0.0)
    }

    fn critical_injury_count(&self, injuries: &[String]) -> usize {
        injuries
            .iter()
            .filter(|injury| contains_any(injury, CRITICAL_INJURY_PATTERNS))
            .count()
    }

    /// Shock index adjusted for injury burden and mechanism.
    ///
    /// Traditional SI is HR/SBP; this variant scales it up by 0.2 per
    /// critical-pattern injury, 0.3 when more than three injuries are
    /// selected, and 0.25 for a high-energy mechanism. Returns 0 when heart
    /// rate or systolic BP is unknown.
    pub fn enhanced_shock_index(&self, factors: &TriageFactors) -> f64 {
        let (Some(heart_rate), Some(systolic_bp)) = (
            Self::observed(factors.heart_rate),
            Self::observed(factors.systolic_bp),
        ) else {
            return 0.0;
        };

        let base = heart_rate / systolic_bp;
        let mut multiplier = 1.0;

        if factors.visible_injuries && !factors.selected_injuries.is_empty() {
            let critical = self.critical_injury_count(&factors.selected_injuries);
            multiplier += critical as f64 * 0.2;

            // Multiple injuries compound the effect
            if factors.selected_injuries.len() > 3 {
                multiplier += 0.3;
            }
        }

        if let Some(mechanism) = &factors.mechanism {
            if contains_any(mechanism, HIGH_ENERGY_MECHANISMS) {
                multiplier += 0.25;
            }
        }

        base * multiplier
    }

    /// Injury severity sub-score from anatomical regions and patterns.
    fn injury_severity(&self, factors: &TriageFactors) -> ScoreBlock {
        if !factors.visible_injuries || factors.selected_injuries.is_empty() {
            return ScoreBlock {
                score: 0,
                reasons: vec!["No visible injuries reported".to_string()],
            };
        }

        let mut score = 0u32;
        let mut reasons = Vec::new();
        let mut critical_count = 0usize;
        let mut severe_count = 0usize;
        let mut regions: HashSet<&'static str> = HashSet::new();

        for injury in &factors.selected_injuries {
            let lower = injury.to_lowercase();

            if CRITICAL_INJURY_PATTERNS.iter().any(|p| lower.contains(p)) {
                critical_count += 1;
                score += 7;

                if lower.contains("head") || lower.contains("brain") || lower.contains("skull") {
                    regions.insert("head");
                } else if lower.contains("chest") || lower.contains("thorax") {
                    regions.insert("chest");
                } else if lower.contains("abdom") || lower.contains("pelv") {
                    regions.insert("abdomen");
                } else if lower.contains("spin") || lower.contains("neck") {
                    regions.insert("spine");
                }

                reasons.push(format!("Critical injury: {injury}"));
            } else if SEVERE_INJURY_KEYWORDS.iter().any(|k| lower.contains(k)) {
                severe_count += 1;
                score += 4;
                reasons.push(format!("Severe injury: {injury}"));
            } else {
                score += 1;
                reasons.push(format!("Moderate injury: {injury}"));
            }
        }

        // Multiple body system involvement increases severity
        if regions.len() >= 3 {
            score += 5;
            reasons.push("Multiple body systems involved".to_string());
        } else if regions.len() >= 2 {
            score += 3;
            reasons.push("Multiple body regions affected".to_string());
        }

        if critical_count >= 2 {
            score += 4;
            reasons.push("Multiple critical injuries (polytrauma)".to_string());
        } else if critical_count + severe_count >= 3 {
            score += 2;
            reasons.push("Multiple significant injuries".to_string());
        }

        ScoreBlock {
            score: score.min(INJURY_SEVERITY_CAP),
            reasons,
        }
    }

    /// Vital signs sub-score: enhanced shock index bands first, then the
    /// classic per-vital deviation bands.
    fn vital_signs(&self, factors: &TriageFactors) -> ScoreBlock {
        let mut score = 0u32;
        let mut reasons = Vec::new();

        let shock_index = self.enhanced_shock_index(factors);
        if shock_index > 0.0 {
            if shock_index > 1.3 {
                score += 6;
                reasons.push(format!("Critical enhanced shock index: {shock_index:.2}"));
            } else if shock_index > 1.0 {
                score += 4;
                reasons.push(format!("High enhanced shock index: {shock_index:.2}"));
            } else if shock_index > 0.8 {
                score += 2;
                reasons.push(format!("Elevated enhanced shock index: {shock_index:.2}"));
            }
        }

        if let Some(heart_rate) = Self::observed(factors.heart_rate) {
            if heart_rate > 120.0 || heart_rate < 50.0 {
                score += 3;
                reasons.push(format!("Critical heart rate: {heart_rate} BPM"));
            } else if heart_rate > 100.0 || heart_rate < 60.0 {
                score += 1;
                reasons.push(format!("Abnormal heart rate: {heart_rate} BPM"));
            }
        }

        if let Some(systolic_bp) = Self::observed(factors.systolic_bp) {
            if systolic_bp < 90.0 {
                score += 4;
                reasons.push(format!("Hypotension: {systolic_bp} mmHg"));
            } else if systolic_bp < 110.0 {
                score += 2;
                reasons.push(format!("Low systolic BP: {systolic_bp} mmHg"));
            } else if systolic_bp > 180.0 {
                score += 2;
                reasons.push(format!("Severe hypertension: {systolic_bp} mmHg"));
            }
        }

        if let Some(respiratory_rate) = Self::observed(factors.respiratory_rate) {
            if respiratory_rate > 30.0 || respiratory_rate < 8.0 {
                score += 3;
                reasons.push(format!("Critical respiratory rate: {respiratory_rate}/min"));
            } else if respiratory_rate > 24.0 || respiratory_rate < 12.0 {
                score += 1;
                reasons.push(format!("Abnormal respiratory rate: {respiratory_rate}/min"));
            }
        }

        if let Some(oxygen_saturation) = Self::observed(factors.oxygen_saturation) {
            if oxygen_saturation < 90.0 {
                score += 4;
                reasons.push(format!("Critical oxygen saturation: {oxygen_saturation}%"));
            } else if oxygen_saturation < 95.0 {
                score += 2;
                reasons.push(format!("Low oxygen saturation: {oxygen_saturation}%"));
            }
        }

        ScoreBlock { score, reasons }
    }

    /// Consciousness tier plus high-energy mechanism bonus.
    fn consciousness_and_mechanism(&self, factors: &TriageFactors) -> ScoreBlock {
        let mut score = 0u32;
        let mut reasons = Vec::new();

        if let Some(consciousness) = &factors.consciousness {
            if contains_any(consciousness, UNRESPONSIVE_KEYWORDS) {
                score += 8;
                reasons.push("Patient unconscious/unresponsive".to_string());
            } else if contains_any(consciousness, ALTERED_KEYWORDS) {
                score += 4;
                reasons.push("Altered level of consciousness".to_string());
            } else if contains_any(consciousness, DROWSY_KEYWORDS) {
                score += 2;
                reasons.push("Decreased alertness".to_string());
            }
        }

        if let Some(mechanism) = &factors.mechanism {
            if contains_any(mechanism, HIGH_ENERGY_MECHANISMS) {
                score += 3;
                reasons.push(format!("High-energy mechanism: {mechanism}"));
            }
        }

        ScoreBlock { score, reasons }
    }

    /// Intervention counts as a proxy for case complexity.
    fn paramedic_actions(&self, factors: &TriageFactors) -> ScoreBlock {
        let mut score = 0u32;
        let mut reasons = Vec::new();

        if factors.emergency_action_count > 0 {
            score += factors.emergency_action_count * 3;
            reasons.push(format!(
                "{} emergency intervention(s) performed",
                factors.emergency_action_count
            ));
        }

        if factors.medication_count > 0 {
            score += factors.medication_count * 2;
            reasons.push(format!(
                "{} medication(s) administered",
                factors.medication_count
            ));
        }

        if factors.action_count > 5 {
            score += 2;
            reasons.push("Multiple interventions required".to_string());
        }

        ScoreBlock { score, reasons }
    }

    /// Full classification pass: combines the four sub-scores (injuries
    /// weighted x1.5) and applies the hard critical overrides.
    pub fn classify(&self, factors: &TriageFactors) -> TriageResult {
        let mut reasoning = Vec::new();

        let injury = self.injury_severity(factors);
        let injury_score = injury.score;
        let mut total = f64::from(injury_score) * 1.5;
        reasoning.extend(injury.reasons);

        let vitals = self.vital_signs(factors);
        total += f64::from(vitals.score);
        reasoning.extend(vitals.reasons);

        let consciousness = self.consciousness_and_mechanism(factors);
        total += f64::from(consciousness.score);
        reasoning.extend(consciousness.reasons);

        let actions = self.paramedic_actions(factors);
        total += f64::from(actions.score);
        reasoning.extend(actions.reasons);

        let shock_index = self.enhanced_shock_index(factors);

        let unresponsive = factors
            .consciousness
            .as_deref()
            .map(|c| {
                let lower = c.to_lowercase();
                lower.contains("unconscious") || lower.contains("unresponsive")
            })
            .unwrap_or(false);
        let critical_saturation = Self::observed(factors.oxygen_saturation)
            .map(|s| s < 85.0)
            .unwrap_or(false);
        let critical_pressure = Self::observed(factors.systolic_bp)
            .map(|s| s < 70.0)
            .unwrap_or(false);

        let mut level = TriageLevel::Green;
        if unresponsive || critical_saturation || critical_pressure || shock_index > 1.4 {
            level = TriageLevel::Red;
            reasoning.insert(
                0,
                "Critical condition detected - immediate intervention required".to_string(),
            );
        } else if total >= 15.0 || shock_index > 1.0 {
            level = TriageLevel::Red;
        } else if total >= 8.0 || shock_index > 0.8 {
            level = TriageLevel::Yellow;
        } else if total >= 3.0 {
            level = TriageLevel::Green;
        }

        // Two or more critical-pattern injuries are always red, regardless
        // of the score thresholds above.
        if !factors.selected_injuries.is_empty()
            && self.critical_injury_count(&factors.selected_injuries) >= 2
        {
            level = TriageLevel::Red;
            if !reasoning.iter().any(|r| r.contains("Critical condition")) {
                reasoning.insert(
                    0,
                    "Multiple critical injuries - immediate care required".to_string(),
                );
            }
        }

        TriageResult {
            level,
            score: (total * 10.0).round() / 10.0,
            reasoning: if reasoning.is_empty() {
                vec!["Standard assessment - no critical findings".to_string()]
            } else {
                reasoning
            },
            shock_index: (shock_index > 0.0).then(|| (shock_index * 100.0).round() / 100.0),
            injury_severity_score: Some(injury_score),
        }
    }
}

// ===== Presentation Helpers =====

/// Display banding for shock index values on triage badges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShockIndexBand {
    Critical,
    High,
    Elevated,
    Normal,
}

impl ShockIndexBand {
    pub fn for_value(shock_index: f64) -> Self {
        if shock_index > 1.0 {
            ShockIndexBand::Critical
        } else if shock_index > 0.9 {
            ShockIndexBand::High
        } else if shock_index > 0.7 {
            ShockIndexBand::Elevated
        } else {
            ShockIndexBand::Normal
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            ShockIndexBand::Critical => "red",
            ShockIndexBand::High => "orange",
            ShockIndexBand::Elevated => "yellow",
            ShockIndexBand::Normal => "green",
        }
    }
}
