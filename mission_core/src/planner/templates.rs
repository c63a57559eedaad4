//! Per-world question templates.
//!
//! Stand-in for the external question bank; the planner cycles through
//! these when composing a quest sequence.

use quest_rules::World;

pub(crate) struct QuestTemplate {
    pub prompt: &'static str,
    /// (text, correct), rendered as options a-d in order.
    pub options: [(&'static str, bool); 4],
}

pub(crate) fn templates_for(world: World) -> &'static [QuestTemplate] {
    match world {
        World::Health => HEALTH,
        World::It => IT,
        World::Legal => LEGAL,
        World::Public => PUBLIC,
        World::Factory => FACTORY,
    }
}

static HEALTH: &[QuestTemplate] = &[
    QuestTemplate {
        prompt: "Which protective gear is required inside the clean room?",
        options: [
            ("Sterile gown, gloves, mask, and cap", true),
            ("Gloves and mask only", false),
            ("Regular work clothes are fine", false),
            ("No special requirements", false),
        ],
    },
    QuestTemplate {
        prompt: "What is the first step after a needlestick injury?",
        options: [
            ("Rinse the wound and report the incident immediately", true),
            ("Finish the shift and report tomorrow", false),
            ("Apply a bandage and continue working", false),
            ("Nothing, if the needle looked clean", false),
        ],
    },
];

static IT: &[QuestTemplate] = &[
    QuestTemplate {
        prompt: "What is the most important defense against phishing?",
        options: [
            ("Verify links before clicking them", true),
            ("Delete all incoming email", false),
            ("Share passwords with the help desk", false),
            ("Disable the firewall", false),
        ],
    },
    QuestTemplate {
        prompt: "A USB stick of unknown origin lies in the parking lot. What do you do?",
        options: [
            ("Hand it to IT security without plugging it in", true),
            ("Plug it in to find the owner", false),
            ("Take it home for private use", false),
            ("Throw it in the trash", false),
        ],
    },
];

static LEGAL: &[QuestTemplate] = &[
    QuestTemplate {
        prompt: "Which GDPR article governs the right to erasure?",
        options: [
            ("Article 17", true),
            ("Article 5", false),
            ("Article 32", false),
            ("Article 88", false),
        ],
    },
    QuestTemplate {
        prompt: "A customer requests a copy of their stored personal data. How long may the response take?",
        options: [
            ("One month, extendable in complex cases", true),
            ("One week, no exceptions", false),
            ("Six months", false),
            ("There is no time limit", false),
        ],
    },
];

static PUBLIC: &[QuestTemplate] = &[
    QuestTemplate {
        prompt: "What priority does a citizen's urgent application receive?",
        options: [
            ("Highest - immediate processing", true),
            ("Normal - processed in arrival order", false),
            ("Low - after standard applications", false),
            ("No priority", false),
        ],
    },
    QuestTemplate {
        prompt: "A caller asks for another citizen's file by phone. What applies?",
        options: [
            ("No disclosure without verified identity and legal basis", true),
            ("Reading out the file is fine if the caller sounds credible", false),
            ("Only the address may be shared", false),
            ("Disclosure is allowed after business hours", false),
        ],
    },
];

static FACTORY: &[QuestTemplate] = &[
    QuestTemplate {
        prompt: "What must be observed with the emergency stop?",
        options: [
            ("Press immediately in danger, then evacuate", true),
            ("Ask the supervisor first", false),
            ("Wait until the end of the shift", false),
            ("Ignore it and keep working", false),
        ],
    },
    QuestTemplate {
        prompt: "When is hearing protection mandatory on the shop floor?",
        options: [
            ("Whenever noise exceeds the posted exposure limit", true),
            ("Only during night shifts", false),
            ("Only for visitors", false),
            ("Never, it is optional", false),
        ],
    },
];
