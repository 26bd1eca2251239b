use lazy_static::lazy_static;
use regex::Regex;

use crate::transcription::SpeakerRole;

/// Phrases that confidently identify the clinician: prescriptive and
/// procedural boilerplate, plus provider self-identification. Matched on
/// lower-cased text.
const STRONG_CLINICIAN: &[&str] = &[
    "vou prescrever",
    "vou receitar",
    "vou te receitar",
    "vou solicitar",
    "vou pedir um exame",
    "vou pedir uns exames",
    "vou encaminhar",
    "vou te examinar",
    "vou examinar",
    "vou ajustar a dose",
    "vou emitir a receita",
    "vou atestar",
    "sou o doutor",
    "sou a doutora",
    "sou o médico",
    "sou a médica",
    "aqui é o doutor",
    "aqui é a doutora",
    "qual é a sua queixa",
    "o que você está sentindo",
    "o que te traz aqui",
    "pode me contar o que houve",
    "vamos começar a consulta",
    "tome este medicamento",
    "retorne em",
    "marque o retorno",
];

/// Phrases that confidently identify the patient: first-person symptom
/// reports and patient self-identification.
const STRONG_PATIENT: &[&str] = &[
    "estou sentindo",
    "estou com dor",
    "estou com febre",
    "sinto dor",
    "sinto uma dor",
    "me dói",
    "minha dor",
    "tenho sentido",
    "venho sentindo",
    "não estou conseguindo",
    "não consigo dormir",
    "sou o paciente",
    "sou a paciente",
    "doutor, eu",
    "doutora, eu",
    "estou tomando o remédio",
    "piora à noite",
    "desde ontem",
    "há alguns dias",
    "faz uma semana que",
];

lazy_static! {
    /// Medium-confidence first-person symptom grammar: a first-person
    /// singular verb followed by a symptom-ish complement.
    static ref FIRST_PERSON_SYMPTOM: Regex = Regex::new(
        r"\b(estou|sinto|tenho|venho)\s+(sentindo|com|tendo|muita?s?\s+)?\s*(dor|dores|febre|tontura|enjoo|náusea|cansaço|ansiedade|insônia|falta de ar)\b"
    )
    .unwrap();
}

/// Which rule produced a classification. Reported for diagnostics and kept
/// explicit so the precedence is independently testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    StrongClinicianKeyword,
    StrongPatientKeyword,
    FirstPersonSymptom,
    OrderPrior,
}

/// Confidence band attached to a rule match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleConfidence {
    High,
    Medium,
    Low,
}

/// Outcome of classifying one utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub role: SpeakerRole,
    pub rule: Option<RuleKind>,
    pub confidence: Option<RuleConfidence>,
}

impl Classification {
    fn matched(role: SpeakerRole, rule: RuleKind, confidence: RuleConfidence) -> Self {
        Self {
            role,
            rule: Some(rule),
            confidence: Some(confidence),
        }
    }

    fn unknown() -> Self {
        Self {
            role: SpeakerRole::Unknown,
            rule: None,
            confidence: None,
        }
    }
}

/// Session context consulted by the order-based priors.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnContext {
    /// No utterance (interim or final) has been seen yet.
    pub first_utterance: bool,
    /// The upstream speaker tag just changed relative to the previous
    /// utterance.
    pub hint_changed: bool,
    /// Confirmed role of the sole registered speaker, when exactly one
    /// speaker exists.
    pub sole_speaker_role: Option<SpeakerRole>,
}

/// Classify an utterance against the ordered rule list.
///
/// Rules are evaluated top-to-bottom with early exit:
///
/// 1. strong clinician keywords
/// 2. strong patient keywords
/// 3. first-person symptom grammar (medium confidence, implies patient)
/// 4. order-based priors (first utterance defaults to clinician; the first
///    utterance of an apparent second party defaults to patient)
///
/// The clinician set is checked first on purpose: when an utterance matches
/// both sets the provider wins, because providers self-identify with highly
/// specific boilerplate phrasing. This is an empirically tuned policy
/// choice, not a physical constraint; there is no ground-truth identity
/// signal without upstream diarization support.
pub fn classify(lowercased: &str, ctx: &TurnContext) -> Classification {
    if STRONG_CLINICIAN.iter().any(|kw| lowercased.contains(kw)) {
        return Classification::matched(
            SpeakerRole::Doctor,
            RuleKind::StrongClinicianKeyword,
            RuleConfidence::High,
        );
    }

    if STRONG_PATIENT.iter().any(|kw| lowercased.contains(kw)) {
        return Classification::matched(
            SpeakerRole::Patient,
            RuleKind::StrongPatientKeyword,
            RuleConfidence::High,
        );
    }

    if FIRST_PERSON_SYMPTOM.is_match(lowercased) {
        return Classification::matched(
            SpeakerRole::Patient,
            RuleKind::FirstPersonSymptom,
            RuleConfidence::Medium,
        );
    }

    // Typical sessions open with the provider introducing themselves.
    if ctx.first_utterance {
        return Classification::matched(
            SpeakerRole::Doctor,
            RuleKind::OrderPrior,
            RuleConfidence::Low,
        );
    }

    // A changed upstream tag while only the clinician is registered is the
    // best available evidence that the other party started talking.
    if ctx.hint_changed && ctx.sole_speaker_role == Some(SpeakerRole::Doctor) {
        return Classification::matched(
            SpeakerRole::Patient,
            RuleKind::OrderPrior,
            RuleConfidence::Low,
        );
    }

    Classification::unknown()
}
