use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use std::collections::BTreeMap;
use std::path::Path;

/// Oxford 102 Flowers class names in dataset order.
pub const OXFORD_FLOWERS: [&str; 102] = [
    "pink primrose",
    "hard-leaved pocket orchid",
    "canterbury bells",
    "sweet pea",
    "english marigold",
    "tiger lily",
    "moon orchid",
    "bird of paradise",
    "monkshood",
    "globe thistle",
    "snapdragon",
    "colt's foot",
    "king protea",
    "spear thistle",
    "yellow iris",
    "globe-flower",
    "purple coneflower",
    "peruvian lily",
    "balloon flower",
    "giant white arum lily",
    "fire lily",
    "pincushion flower",
    "fritillary",
    "red ginger",
    "grape hyacinth",
    "corn poppy",
    "prince of wales feathers",
    "stemless gentian",
    "artichoke",
    "sweet william",
    "carnation",
    "garden phlox",
    "love in the mist",
    "mexican aster",
    "alpine sea holly",
    "ruby-lipped cattleya",
    "cape flower",
    "great masterwort",
    "siam tulip",
    "lenten rose",
    "barbeton daisy",
    "daffodil",
    "sword lily",
    "poinsettia",
    "bolero deep blue",
    "wallflower",
    "marigold",
    "buttercup",
    "oxeye daisy",
    "common dandelion",
    "petunia",
    "wild pansy",
    "primula",
    "sunflower",
    "pelargonium",
    "bishop of llandaff",
    "gaura",
    "geranium",
    "orange dahlia",
    "pink-yellow dahlia",
    "cautleya spicata",
    "japanese anemone",
    "black-eyed susan",
    "silverbush",
    "californian poppy",
    "osteospermum",
    "spring crocus",
    "bearded iris",
    "windflower",
    "tree poppy",
    "gazania",
    "azalea",
    "water lily",
    "rose",
    "thorn apple",
    "morning glory",
    "passion flower",
    "lotus",
    "toad lily",
    "anthurium",
    "frangipani",
    "clematis",
    "hibiscus",
    "columbine",
    "desert-rose",
    "tree mallow",
    "magnolia",
    "cyclamen",
    "watercress",
    "canna lily",
    "hippeastrum",
    "bee balm",
    "ball moss",
    "foxglove",
    "bougainvillea",
    "camellia",
    "mallow",
    "mexican petunia",
    "bromelia",
    "blanket flower",
    "trumpet creeper",
    "blackberry lily",
];

/// Vietnamese display names keyed by a fragment of the English species name.
/// Order matters: the first fragment contained in a name wins.
pub const VIETNAMESE_NAMES: [(&str, &str); 20] = [
    ("rose", "Hoa Hồng"),
    ("sunflower", "Hoa Hướng Dương"),
    ("daisy", "Hoa Cúc"),
    ("tulip", "Hoa Tulip"),
    ("lily", "Hoa Lily"),
    ("orchid", "Hoa Lan"),
    ("carnation", "Hoa Cẩm Chướng"),
    ("daffodil", "Hoa Thủy Tiên"),
    ("iris", "Hoa Diên Vĩ"),
    ("dahlia", "Hoa Thược Dược"),
    ("peony", "Hoa Mẫu Đơn"),
    ("chrysanthemum", "Hoa Cúc"),
    ("lavender", "Hoa Oải Hương"),
    ("hydrangea", "Hoa Cẩm Tú Cầu"),
    ("jasmine", "Hoa Nhài"),
    ("lotus", "Hoa Sen"),
    ("magnolia", "Hoa Mộc Lan"),
    ("marigold", "Hoa Vạn Thọ"),
    ("poppy", "Hoa Anh Túc"),
    ("zinnia", "Hoa Cúc Zinnia"),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum IdBase {
    #[default]
    Zero,
    One,
}

impl IdBase {
    pub fn offset(self) -> u32 {
        match self {
            IdBase::Zero => 0,
            IdBase::One => 1,
        }
    }
}

/// Read-only lookup from class id to species name, plus an optional
/// fragment table used to pick a display-language name.
#[derive(Debug, Clone, Default)]
pub struct LabelCatalog {
    names: BTreeMap<u32, String>,
    base: IdBase,
    translations: Vec<(String, String)>,
}

impl LabelCatalog {
    pub fn new(names: BTreeMap<u32, String>, base: IdBase) -> Self {
        Self {
            names,
            base,
            translations: Vec::new(),
        }
    }

    /// Builds a catalog from names listed in class order, numbering them from `base`.
    pub fn from_ordered<I, S>(names: I, base: IdBase) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names
            .into_iter()
            .zip(base.offset()..)
            .map(|(name, id)| (id, name.into()))
            .collect();
        Self::new(names, base)
    }

    pub fn oxford_flowers(base: IdBase) -> Self {
        Self::from_ordered(OXFORD_FLOWERS, base)
    }

    /// Loads names from a JSON object keyed by id, or from a text file with
    /// one name per line.
    pub fn from_file(path: &Path, base: IdBase) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read label file {}", path.display()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            let raw: BTreeMap<String, String> = serde_json::from_str(&contents)
                .with_context(|| format!("Label file {} is not a JSON object", path.display()))?;
            let mut names = BTreeMap::new();
            for (id, name) in raw {
                let id: u32 = id
                    .trim()
                    .parse()
                    .with_context(|| format!("Label id {id:?} is not an integer"))?;
                names.insert(id, name);
            }
            Ok(Self::new(names, base))
        } else {
            Ok(Self::from_ordered(
                contents.lines().map(str::trim).filter(|line| !line.is_empty()),
                base,
            ))
        }
    }

    pub fn with_translations<I, F, D>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (F, D)>,
        F: Into<String>,
        D: Into<String>,
    {
        self.translations = pairs
            .into_iter()
            .map(|(fragment, display)| (fragment.into().to_lowercase(), display.into()))
            .collect();
        self
    }

    pub fn with_vietnamese_names(self) -> Self {
        self.with_translations(VIETNAMESE_NAMES)
    }

    /// Parses `fragment=Display Name` lines, keeping their order.
    pub fn load_translations(path: &Path) -> Result<Vec<(String, String)>> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read translation file {}", path.display()))?;

        let mut pairs = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((fragment, display)) = line.split_once('=') else {
                bail!("{}:{}: expected `fragment=name`", path.display(), line_no + 1);
            };
            let fragment = fragment.trim();
            if fragment.is_empty() {
                bail!("{}:{}: empty fragment", path.display(), line_no + 1);
            }
            pairs.push((fragment.to_string(), display.trim().to_string()));
        }
        Ok(pairs)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn base(&self) -> IdBase {
        self.base
    }

    /// Ids must cover `[base, base + len)` without gaps.
    pub fn is_contiguous(&self) -> bool {
        let start = self.base.offset();
        self.names
            .keys()
            .zip(start..)
            .all(|(&id, expected)| id == expected)
    }

    pub fn name(&self, class_id: u32) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }

    pub fn translate(&self, class_name: &str) -> Option<&str> {
        let lowered = class_name.to_lowercase();
        self.translations
            .iter()
            .find(|(fragment, _)| lowered.contains(fragment.as_str()))
            .map(|(_, display)| display.as_str())
    }

    pub fn display_name(&self, class_name: &str) -> String {
        self.translate(class_name)
            .unwrap_or(class_name)
            .to_string()
    }
}
