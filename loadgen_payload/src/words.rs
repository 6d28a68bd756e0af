//! Static vocabularies used to build pronounceable names and values.

/// Service names.
pub const SPICES: &[&str] = &[
    "allspice", "anise", "basil", "bay", "black pepper", "cardamom", "cayenne", "cinnamon",
    "cloves", "coriander", "cumin", "curry", "dill", "fennel", "fenugreek", "garlic", "ginger",
    "marjoram", "mustard", "nutmeg", "oregano", "paprika", "parsley", "pepper", "rosemary",
    "saffron", "sage", "salt", "tarragon", "thyme", "turmeric", "vanilla", "caraway", "chili",
    "masala", "lemongrass", "mint", "poppy", "sesame", "sumac", "mace", "nigella", "peppercorn",
    "wasabi",
];

/// Common adjectives, the first half of a word pair.
pub const ADJECTIVES: &[&str] = &[
    "able", "bad", "best", "better", "big", "black", "certain", "clear", "different", "early",
    "easy", "economic", "federal", "free", "full", "good", "great", "hard", "high", "human",
    "important", "international", "large", "late", "little", "local", "long", "low", "major",
    "military", "national", "new", "old", "only", "other", "political", "possible", "public",
    "real", "recent", "right", "small", "social", "special", "strong", "sure", "true", "white",
    "whole", "young",
];

/// Common nouns, the second half of a word pair and the key vocabulary.
pub const NOUNS: &[&str] = &[
    "angle", "ant", "apple", "arch", "arm", "army", "baby", "bag", "ball", "band", "basin",
    "basket", "bath", "bed", "bee", "bell", "berry", "bird", "blade", "board", "boat", "bone",
    "book", "boot", "bottle", "box", "boy", "brain", "brake", "branch", "brick", "bridge", "brush",
    "bucket", "bulb", "button", "cake", "camera", "card", "carriage", "cart", "cat", "chain",
    "cheese", "chess", "chin", "church", "circle", "clock", "cloud", "coat", "collar", "comb",
    "cord", "cow", "cup", "curtain", "cushion", "dog", "door", "drain", "drawer", "dress", "drop",
    "ear", "egg", "engine", "eye", "face", "farm", "feather", "finger", "fish", "flag", "floor",
    "fly", "foot", "fork", "fowl", "frame", "garden", "girl", "glove", "goat", "gun", "hair",
    "hammer", "hand", "hat", "head", "heart", "hook", "horn", "horse", "hospital", "house",
    "island", "jewel", "kettle", "key", "knee", "knife", "knot", "leaf", "leg", "library", "line",
    "lip", "lock", "map", "match", "monkey", "moon", "mouth", "muscle", "nail", "neck", "needle",
    "nerve", "net", "nose", "nut", "office", "orange", "oven", "parcel", "pen", "pencil", "picture",
    "pig", "pin", "pipe", "plane", "plate", "plough", "pocket", "pot", "potato", "prison", "pump",
    "rail", "rat", "receipt", "ring", "rod", "roof", "root", "sail", "school", "scissors", "screw",
    "seed", "sheep", "shelf", "ship", "shirt", "shoe", "skin", "skirt", "snake", "sock", "spade",
    "sponge", "spoon", "spring", "square", "stamp", "star", "station", "stem", "stick", "stocking",
    "stomach", "store", "street", "sun", "table", "tail", "thread", "throat", "thumb", "ticket",
    "toe", "tongue", "tooth", "town", "train", "tray", "tree", "trousers", "umbrella", "wall",
    "watch", "wheel", "whip", "whistle", "window", "wing", "wire", "worm",
];
