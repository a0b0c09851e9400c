//! Fixed event catalog.
//!
//! Events are created once at feed-load time and never deleted; wager
//! application is the only thing that mutates them afterwards. The default
//! catalog is embedded so the binary runs with zero setup; `--catalog-path`
//! swaps in a different JSON file for demos.

use anyhow::{Context, Result};
use std::path::Path;

use crate::models::EventCard;

pub fn load_default() -> Result<Vec<EventCard>> {
    parse(DEFAULT_CATALOG_JSON).context("embedded catalog is invalid")
}

pub fn load_from_file(path: &Path) -> Result<Vec<EventCard>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog file {}", path.display()))?;
    parse(&raw).with_context(|| format!("catalog file {} is invalid", path.display()))
}

fn parse(raw: &str) -> Result<Vec<EventCard>> {
    let events: Vec<EventCard> = serde_json::from_str(raw)?;
    anyhow::ensure!(!events.is_empty(), "catalog contains no events");
    let mut seen = std::collections::HashSet::new();
    for event in &events {
        anyhow::ensure!(
            seen.insert(event.id.clone()),
            "duplicate event id '{}' in catalog",
            event.id
        );
    }
    Ok(events)
}

/// The launch catalog: ten Philippine pop-culture and esports battles.
const DEFAULT_CATALOG_JSON: &str = r##"[
  {
    "id": "e1",
    "title": "Maaari bang ipagtanggol ng isang Philippine team ang titulo sa M7 na ito?",
    "description": "Will a Philippine team defend the title in this M7?",
    "video_url": "https://assert.flickai.io/M7%20World%20Championship%20Roster.mp4",
    "poster_url": "https://images.unsplash.com/photo-1542751371-adc38448a05e?auto=format&fit=crop&q=80&w=800",
    "brand_name": "MLBB M7",
    "option_a": "Oo",
    "option_b": "Hindi",
    "pool_a": 45000,
    "pool_b": 32000,
    "deadline": "2026-01-01T00:00:00Z",
    "status": "ongoing",
    "tags": ["#M7", "#MLBB", "#Esports"]
  },
  {
    "id": "e2",
    "title": "Classic \"PH vs ID\" rematch ba o bagong matchup ang M7 Finals?",
    "description": "Will the M7 Finals be a classic PH vs ID rematch or a new matchup?",
    "video_url": "https://assert.flickai.io/ONIC%20ID%20VS%20ONIC%20PH%20GRAND%20FINALS.mp4",
    "poster_url": "https://images.unsplash.com/photo-1511512578047-9236b382dcc6?auto=format&fit=crop&q=80&w=800",
    "brand_name": "MLBB",
    "option_a": "PH vs ID",
    "option_b": "New Matchup",
    "pool_a": 55000,
    "pool_b": 48000,
    "deadline": "2026-01-01T00:00:00Z",
    "status": "ongoing",
    "tags": ["#M7", "#Rivalry", "#MLBB"]
  },
  {
    "id": "e3",
    "title": "Mababagak ba ng M7 Finals ang peak viewership record ng M5, o hindi?",
    "description": "Will the M7 Finals break the peak viewership record of M5?",
    "video_url": "https://assert.flickai.io/This%20Grand%20Finals%20crowd%20has%20some%20REAL%20MOVES.mp4",
    "poster_url": "https://images.unsplash.com/photo-1518929458119-e5bf44b2f0f1?auto=format&fit=crop&q=80&w=800",
    "brand_name": "Esports Charts",
    "option_a": "Oo",
    "option_b": "Hindi",
    "pool_a": 38000,
    "pool_b": 41000,
    "deadline": "2026-01-01T00:00:00Z",
    "status": "ongoing",
    "tags": ["#Viewership", "#M7", "#Esports"]
  },
  {
    "id": "e4",
    "title": "Sa linggong ito, alin ang mas mataas ang ranggo sa top-grossing chart: PUBG Mobile o Free Fire?",
    "description": "Which game will rank higher in the top-grossing chart this week: PUBG Mobile or Free Fire?",
    "video_url": "https://assert.flickai.io/which%20game%20is%20the%20best.mp4",
    "poster_url": "https://images.unsplash.com/photo-1552820728-8b83bb6b773f?auto=format&fit=crop&q=80&w=800",
    "brand_name": "Mobile Games",
    "option_a": "PUBG",
    "option_b": "Free Fire",
    "pool_a": 62000,
    "pool_b": 59000,
    "deadline": "2026-01-08T00:00:00Z",
    "status": "ongoing",
    "tags": ["#PUBG", "#FreeFire", "#MobileGaming"]
  },
  {
    "id": "e5",
    "title": "Makakakuha kaya ng higit sa 100 milyong PHP sa unang linggo ang pelikulang ito sa 2025 MMFF?",
    "description": "Will this movie gross more than 100 million PHP in the first week of the 2025 MMFF?",
    "video_url": "https://assert.flickai.io/SHAKE%20RATTLE%20ROLL%20EVIL%20ORIGINS%20trailer.mp4",
    "poster_url": "https://images.unsplash.com/photo-1489599849927-2ee91cede3ba?auto=format&fit=crop&q=80&w=800",
    "brand_name": "MMFF",
    "option_a": "Oo",
    "option_b": "Hindi",
    "pool_a": 75000,
    "pool_b": 28000,
    "deadline": "2026-01-10T00:00:00Z",
    "status": "ongoing",
    "tags": ["#MMFF", "#Movies", "#BoxOffice"]
  },
  {
    "id": "e6",
    "title": "Makaka-5 milyong views kaya ang susunod na video ni Ivana Alawi sa loob ng isang araw?",
    "description": "Will Ivana Alawi's next video reach 5 million views within a day?",
    "video_url": "https://assert.flickai.io/Meet%20me%20in%20the%20middle.mp4",
    "poster_url": "https://images.unsplash.com/photo-1611162617474-5b21e879e113?auto=format&fit=crop&q=80&w=800",
    "brand_name": "YouTube PH",
    "option_a": "Oo",
    "option_b": "Hindi",
    "pool_a": 85000,
    "pool_b": 34000,
    "deadline": "2026-01-08T00:00:00Z",
    "status": "ongoing",
    "tags": ["#IvanaAlawi", "#Vlog", "#Trending"]
  },
  {
    "id": "e7",
    "title": "Mananatili pa ba sa top 10 ng music charts ang kantang \"Cup of Joe\" bago mag-kalagitnaan ng Enero 2026?",
    "description": "Will the song \"Cup of Joe\" remain in the top 10 music charts until mid-January 2026?",
    "video_url": "https://assert.flickai.io/Multo%20Live%20at%20The%20Cozy%20Cove.mp4",
    "poster_url": "https://images.unsplash.com/photo-1514525253440-b393452e8d26?auto=format&fit=crop&q=80&w=800",
    "brand_name": "OPM Charts",
    "option_a": "Oo",
    "option_b": "Hindi",
    "pool_a": 42000,
    "pool_b": 39000,
    "deadline": "2026-01-15T00:00:00Z",
    "status": "ongoing",
    "tags": ["#OPM", "#MusicCharts", "#CupOfJoe"]
  },
  {
    "id": "e8",
    "title": "Papasok kaya sa top 3 ng box office ang \"My Love Will Make You Disappear\" bago mag-kalagitnaan ng Enero 2026?",
    "description": "Will \"My Love Will Make You Disappear\" enter the top 3 box office before mid-January 2026?",
    "video_url": "https://assert.flickai.io/My%20Love%20Will%20Make%20You%20Disappear%20Official%20Trailer.mp4",
    "poster_url": "https://images.unsplash.com/photo-1536440136628-849c177e76a1?auto=format&fit=crop&q=80&w=800",
    "brand_name": "Cinema",
    "option_a": "Oo",
    "option_b": "Hindi",
    "pool_a": 55000,
    "pool_b": 48000,
    "deadline": "2026-01-15T00:00:00Z",
    "status": "ongoing",
    "tags": ["#KimPau", "#Movies", "#BoxOffice"]
  },
  {
    "id": "e9",
    "title": "Sa susunod na Ultra Lotto draw, magkakaroon ba ng mas maraming odd o even na nanalong numero?",
    "description": "Will there be more odd or even winning numbers in the next Ultra Lotto draw?",
    "video_url": "https://assert.flickai.io/Lotto%20Result%20Today%205pm%20draw.mp4",
    "poster_url": "https://images.unsplash.com/photo-1518688248740-7c31f1a945c4?auto=format&fit=crop&q=80&w=800",
    "brand_name": "PCSO Lotto",
    "option_a": "Odd",
    "option_b": "Even",
    "pool_a": 95000,
    "pool_b": 92000,
    "deadline": "2026-01-02T00:00:00Z",
    "status": "ongoing",
    "tags": ["#Lotto", "#PCSO", "#Luck"]
  },
  {
    "id": "e10",
    "title": "Maaari bang lumagpas sa $100,000 ang BTC sa Enero 2026?",
    "description": "Will BTC exceed $100,000 in January 2026?",
    "video_url": "https://assert.flickai.io/Bitcoin%20in%202026.mp4",
    "poster_url": "https://images.unsplash.com/photo-1518546305927-5a555bb7020d?auto=format&fit=crop&q=80&w=800",
    "brand_name": "Crypto",
    "option_a": "Oo",
    "option_b": "Hindi",
    "pool_a": 150000,
    "pool_b": 120000,
    "deadline": "2026-02-01T00:00:00Z",
    "status": "ongoing",
    "tags": ["#Bitcoin", "#Crypto", "#Finance"]
  }
]"##;
