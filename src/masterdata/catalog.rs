/// Which masterdata documents feed a category and how their records map
/// onto translation-table fields.
#[derive(Debug)]
pub struct TableSpec {
    pub file: &'static str,
    pub join_key: &'static str,
    /// Key holding the record array when the document is an object.
    pub container: Option<&'static str>,
    /// Records where this field is empty are ignored.
    pub require_field: Option<&'static str>,
    /// `(record field, table field)` pairs.
    pub fields: &'static [(&'static str, &'static str)],
    pub parts: Option<PartsSpec>,
    /// Whether the target-language server publishes this document at all.
    pub parallel: bool,
}

#[derive(Debug)]
pub struct PartsSpec {
    pub container: &'static str,
    pub join_key: &'static str,
    pub fields: &'static [(&'static str, &'static str)],
}

impl TableSpec {
    pub fn all_fields(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        let nested = self.parts.iter().flat_map(|p| p.fields.iter());
        self.fields.iter().chain(nested).copied()
    }
}

#[derive(Debug)]
pub struct CategorySpec {
    pub category: Category,
    pub tables: &'static [TableSpec],
    pub dedup_pending: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Cards,
    Events,
    Gacha,
    VirtualLive,
    Mysekai,
    Sticker,
    Comic,
    Characters,
    Units,
    Costumes,
    Music,
}

impl Category {
    /// Run order when no single category is requested.
    pub const ALL: [Category; 11] = [
        Category::Cards,
        Category::Events,
        Category::Gacha,
        Category::VirtualLive,
        Category::Mysekai,
        Category::Sticker,
        Category::Comic,
        Category::Characters,
        Category::Units,
        Category::Costumes,
        Category::Music,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::Cards => "cards",
            Category::Events => "events",
            Category::Gacha => "gacha",
            Category::VirtualLive => "virtualLive",
            Category::Mysekai => "mysekai",
            Category::Sticker => "sticker",
            Category::Comic => "comic",
            Category::Characters => "characters",
            Category::Units => "units",
            Category::Costumes => "costumes",
            Category::Music => "music",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn spec(self) -> &'static CategorySpec {
        match self {
            Category::Cards => &CARDS,
            Category::Events => &EVENTS,
            Category::Gacha => &GACHA,
            Category::VirtualLive => &VIRTUAL_LIVE,
            Category::Mysekai => &MYSEKAI,
            Category::Sticker => &STICKER,
            Category::Comic => &COMIC,
            Category::Characters => &CHARACTERS,
            Category::Units => &UNITS,
            Category::Costumes => &COSTUMES,
            Category::Music => &MUSIC,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

const fn by_id(file: &'static str, fields: &'static [(&'static str, &'static str)]) -> TableSpec {
    TableSpec {
        file,
        join_key: "id",
        container: None,
        require_field: None,
        fields,
        parts: None,
        parallel: true,
    }
}

const NAME: &[(&str, &str)] = &[("name", "name")];

static CARDS: CategorySpec = CategorySpec {
    category: Category::Cards,
    tables: &[by_id(
        "cards.json",
        &[
            ("prefix", "prefix"),
            ("cardSkillName", "skillName"),
            ("gachaPhrase", "gachaPhrase"),
        ],
    )],
    dedup_pending: false,
};

static EVENTS: CategorySpec = CategorySpec {
    category: Category::Events,
    tables: &[by_id("events.json", NAME)],
    dedup_pending: false,
};

static GACHA: CategorySpec = CategorySpec {
    category: Category::Gacha,
    tables: &[by_id("gachas.json", NAME)],
    dedup_pending: false,
};

static VIRTUAL_LIVE: CategorySpec = CategorySpec {
    category: Category::VirtualLive,
    tables: &[by_id("virtualLives.json", NAME)],
    dedup_pending: false,
};

static MYSEKAI: CategorySpec = CategorySpec {
    category: Category::Mysekai,
    tables: &[
        by_id(
            "mysekaiFixtures.json",
            &[("name", "fixtureName"), ("flavorText", "flavorText")],
        ),
        by_id("mysekaiFixtureMainGenres.json", &[("name", "genre")]),
        by_id("mysekaiFixtureTags.json", &[("name", "tag")]),
    ],
    dedup_pending: true,
};

static STICKER: CategorySpec = CategorySpec {
    category: Category::Sticker,
    tables: &[by_id("stamps.json", NAME)],
    dedup_pending: false,
};

static COMIC: CategorySpec = CategorySpec {
    category: Category::Comic,
    tables: &[TableSpec {
        require_field: Some("assetbundleName"),
        ..by_id("tips.json", &[("title", "title")])
    }],
    dedup_pending: false,
};

static CHARACTERS: CategorySpec = CategorySpec {
    category: Category::Characters,
    tables: &[TableSpec {
        join_key: "characterId",
        ..by_id(
            "characterProfiles.json",
            &[
                ("hobby", "hobby"),
                ("specialSkill", "specialSkill"),
                ("favoriteFood", "favoriteFood"),
                ("hatedFood", "hatedFood"),
                ("weak", "weak"),
                ("introduction", "introduction"),
            ],
        )
    }],
    dedup_pending: true,
};

static UNITS: CategorySpec = CategorySpec {
    category: Category::Units,
    tables: &[TableSpec {
        join_key: "unit",
        ..by_id(
            "unitProfiles.json",
            &[("unitName", "unitName"), ("profileSentence", "profileSentence")],
        )
    }],
    dedup_pending: true,
};

static COSTUMES: CategorySpec = CategorySpec {
    category: Category::Costumes,
    tables: &[TableSpec {
        container: Some("costumes"),
        parts: Some(PartsSpec {
            container: "parts",
            join_key: "assetbundleName",
            fields: &[("colorName", "colorName")],
        }),
        ..by_id("snowy_costumes.json", &[("name", "name"), ("designer", "designer")])
    }],
    dedup_pending: true,
};

// The target server carries no music translations.
static MUSIC: CategorySpec = CategorySpec {
    category: Category::Music,
    tables: &[
        TableSpec {
            parallel: false,
            ..by_id(
                "musics.json",
                &[
                    ("title", "title"),
                    ("lyricist", "artist"),
                    ("composer", "artist"),
                    ("arranger", "artist"),
                ],
            )
        },
        TableSpec {
            parallel: false,
            ..by_id("musicVocals.json", &[("caption", "vocalCaption")])
        },
    ],
    dedup_pending: true,
};
