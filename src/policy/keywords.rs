//! Built-in topic tables
//!
//! Keywords are lower-case and matched on word boundaries, so both accented
//! and unaccented spellings are listed where users commonly type either.

/// Off-topic categories the assistant declines to discuss
pub const BLOCKED_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "física",
        &[
            "física",
            "fisica",
            "mecânica quântica",
            "termodinâmica",
            "eletromagnetismo",
            "relatividade geral",
        ],
    ),
    (
        "química",
        &[
            "química",
            "quimica",
            "estequiometria",
            "tabela periódica",
            "ligação covalente",
        ],
    ),
    (
        "matemática",
        &[
            "matemática",
            "matematica",
            "equação",
            "equações",
            "derivada",
            "álgebra",
            "trigonometria",
            "teorema",
        ],
    ),
    (
        "programação",
        &[
            "programação",
            "programacao",
            "código-fonte",
            "javascript",
            "python",
            "compilador",
            "algoritmo",
        ],
    ),
    (
        "política",
        &[
            "política partidária",
            "eleição",
            "eleições",
            "partido político",
            "candidato",
        ],
    ),
    (
        "apostas",
        &[
            "apostas esportivas",
            "aposta",
            "apostas",
            "cassino",
            "bet",
        ],
    ),
];

/// Phrases that mark a keyword occurrence as part of a wellbeing discussion
pub const ALLOWED_CONTEXT: &[&str] = &[
    "saúde mental",
    "ansiedade",
    "bem-estar",
    "emoç",
    "estresse",
    "sentimento",
    "terapia",
];
