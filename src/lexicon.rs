//! Shared tokenizer and topic lexicon
//!
//! The tag extractor and the built-in embedder both read text through the
//! same normalization so that a topic tag and a concept dimension always
//! agree on which words belong to a topic.

/// A named family of keywords (already normalized).
pub struct Family {
    /// Tag emitted when any keyword matches
    pub name: &'static str,
    /// Normalized keywords
    pub keywords: &'static [&'static str],
}

/// Topic families. Order is significant: it defines the concept dimensions
/// of the lexicon embedder.
pub const TOPICS: &[Family] = &[
    Family {
        name: "ai",
        keywords: &[
            "ai", "artificial", "intelligence", "neural", "network", "deep", "learning", "learn",
            "machine", "model", "robot", "robotic", "robotics", "algorithm", "training", "gpt",
            "llm", "transformer", "chatbot", "automation", "data", "dataset", "computing",
        ],
    },
    Family {
        name: "weather",
        keywords: &[
            "weather", "rain", "raining", "rainy", "sunny", "sun", "cloud", "cloudy", "snow",
            "storm", "forecast", "temperature", "degree", "wind", "windy", "humid", "humidity",
            "breeze", "warm", "hot", "cold",
        ],
    },
    Family {
        name: "food",
        keywords: &[
            "food", "eat", "eating", "cook", "cooking", "recipe", "dinner", "lunch", "breakfast",
            "pizza", "pasta", "sushi", "coffee", "tea", "restaurant", "meal", "vegetarian",
            "vegan", "dessert",
        ],
    },
    Family {
        name: "music",
        keywords: &[
            "music", "song", "band", "guitar", "piano", "concert", "album", "jazz", "rock",
            "sing", "singing", "playlist",
        ],
    },
    Family {
        name: "sport",
        keywords: &[
            "sport", "football", "soccer", "basketball", "tennis", "running", "gym", "workout",
            "exercise", "yoga", "hike", "hiking", "swim", "swimming", "marathon",
        ],
    },
    Family {
        name: "travel",
        keywords: &[
            "travel", "trip", "flight", "vacation", "holiday", "hotel", "beach", "abroad",
            "passport", "tourist", "journey",
        ],
    },
    Family {
        name: "health",
        keywords: &[
            "health", "doctor", "sick", "ill", "medicine", "sleep", "pain", "hospital", "diet",
            "therapy", "headache", "symptom",
        ],
    },
    Family {
        name: "finance",
        keywords: &[
            "money", "budget", "bank", "salary", "invest", "investment", "stock", "saving",
            "price", "cost", "rent", "mortgage", "tax",
        ],
    },
    Family {
        name: "programming",
        keywords: &[
            "code", "coding", "program", "programming", "software", "rust", "python",
            "javascript", "bug", "debug", "compile", "compiler", "api", "database", "server",
            "deploy", "function",
        ],
    },
    Family {
        name: "family",
        keywords: &[
            "family", "mom", "mother", "dad", "father", "sister", "brother", "son", "daughter",
            "wife", "husband", "partner", "kid", "child", "children", "parent", "grandma",
            "grandpa",
        ],
    },
    Family {
        name: "work",
        keywords: &[
            "work", "working", "job", "project", "task", "deadline", "meeting", "office", "boss",
            "colleague", "career", "client", "team", "schedule", "interview", "manager",
        ],
    },
];

/// Affective vocabulary, tagged `emotional`.
pub const EMOTIONAL: Family = Family {
    name: "emotional",
    keywords: &[
        "feel", "feeling", "felt", "happy", "sad", "excited", "exciting", "love", "hate", "angry",
        "anxious", "worried", "stressed", "afraid", "lonely", "grateful", "frustrated", "nervous",
        "thrilled", "upset", "proud", "scared", "depressed", "overwhelmed",
    ],
};

/// Preference vocabulary, tagged `preference`.
pub const PREFERENCE: Family = Family {
    name: "preference",
    keywords: &[
        "prefer", "preference", "like", "favorite", "favourite", "enjoy", "dislike", "rather",
        "fan",
    ],
};

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "is", "are", "was", "were", "be", "been", "to", "of",
    "in", "on", "at", "by", "for", "with", "about", "as", "it", "its", "this", "that", "me",
    "my", "you", "your", "we", "our", "they", "them", "he", "she", "his", "her", "i", "do",
    "does", "did", "what", "which", "who", "how", "so", "very", "can", "could", "would",
    "should", "will", "from", "into", "than", "then", "there", "here", "some", "any", "tell",
];

/// Lowercase, split on non-alphanumerics and fold simple plurals.
///
/// Stopwords are matched on the unfolded word, so "this" or "does" never
/// survive as "thi" or "doe". Single characters are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 1)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .map(|w| normalize(&w))
        .collect()
}

fn normalize(word: &str) -> String {
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

impl Family {
    /// Whether this family's vocabulary contains a normalized token.
    pub fn contains(&self, token: &str) -> bool {
        self.keywords.contains(&token)
    }

    /// Number of tokens belonging to this family.
    pub fn hits(&self, tokens: &[String]) -> usize {
        tokens.iter().filter(|t| self.contains(t)).count()
    }
}
