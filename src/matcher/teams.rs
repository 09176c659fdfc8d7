//! Team alias tables, noise stripping, and team extraction
//!
//! Built-in alias maps cover the leagues this tool is most used with; a
//! sport config can select one by name and layer its own entries on top.
//! At normalization time the lookup is extended with entities mined from
//! episode titles and aliases, so "Celtics" resolves to "Boston Celtics"
//! even when the config supplies no aliases at all.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::Show;
use crate::services::text_utils::normalize_token;

/// Provider/quality tokens that terminate a team-name capture.
const NOISE_PROVIDERS: &[&str] = &[
    "sky", "fubo", "espn", "espnplus", "tsn", "nbcsn", "fox", "verum",
];

fn team_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?P<a>[A-Za-z0-9 .&'/-]+?)\s+(?:vs\.?|v|at|@)\s+(?P<b>[A-Za-z0-9 .&'/-]+)")
            .expect("team pattern is valid")
    })
}

/// Strip trailing noise (resolutions, frame rates, providers, release tags)
/// from a raw team capture. Stops at the first noise token.
pub fn strip_team_noise(value: &str) -> String {
    let mut cleaned: Vec<&str> = Vec::new();
    for token in value.split_whitespace() {
        let lowered = token.to_ascii_lowercase();
        if lowered.chars().all(|c| c.is_ascii_digit()) {
            break;
        }
        if is_resolution(&lowered) || is_fps(&lowered) {
            break;
        }
        if NOISE_PROVIDERS.contains(&lowered.replace('+', "").as_str()) {
            break;
        }
        if matches!(lowered.as_str(), "proper" | "repack" | "web" | "hdtv") {
            break;
        }
        cleaned.push(token);
    }
    cleaned.join(" ").trim().to_string()
}

fn is_resolution(token: &str) -> bool {
    token.len() >= 4
        && token.ends_with('p')
        && token[..token.len() - 1].chars().all(|c| c.is_ascii_digit())
}

fn is_fps(token: &str) -> bool {
    token.len() == 5 && token.ends_with("fps") && token[..2].chars().all(|c| c.is_ascii_digit())
}

/// Extract up to two team names from matchup text like "Team A vs Team B",
/// resolving each through the alias lookup. The left capture often drags in
/// competition and date tokens ("NBA RS 2025 Indiana Pacers"), so each side
/// is resolved via its longest alias-resolving token suffix.
pub fn extract_teams_from_text(text: &str, alias_lookup: &HashMap<String, String>) -> Vec<String> {
    let Some(captures) = team_pattern().captures(text) else {
        return Vec::new();
    };
    let mut teams = Vec::new();
    for key in ["a", "b"] {
        if let Some(raw) = captures.name(key) {
            if let Some(team) = resolve_team_capture(raw.as_str(), alias_lookup) {
                teams.push(team);
            }
        }
    }
    teams
}

fn resolve_team_capture(raw: &str, alias_lookup: &HashMap<String, String>) -> Option<String> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    // Longest suffix that resolves through the alias table wins.
    for start in 0..tokens.len() {
        let candidate = strip_team_noise(&tokens[start..].join(" "));
        let normalized = normalize_token(&candidate);
        if normalized.is_empty() {
            continue;
        }
        if let Some(canonical) = alias_lookup.get(&normalized) {
            return Some(canonical.clone());
        }
    }
    let stripped = strip_team_noise(raw);
    let trimmed = stripped.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Resolve a team name through the alias lookup; `None` when unknown.
pub fn canonicalize_team(value: &str, alias_lookup: &HashMap<String, String>) -> Option<String> {
    if alias_lookup.is_empty() {
        return None;
    }
    let normalized = normalize_token(value);
    if normalized.is_empty() {
        return None;
    }
    alias_lookup.get(&normalized).cloned()
}

/// Extend a base alias lookup with teams mined from episode titles and
/// aliases across the show.
pub fn build_team_alias_lookup(
    show: &Show,
    base: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut lookup = base.clone();
    for season in &show.seasons {
        for episode in &season.episodes {
            let episode_teams = extract_teams_from_text(&episode.title, &lookup);
            for team in &episode_teams {
                let token = normalize_token(team);
                if !token.is_empty() {
                    lookup.entry(token).or_insert_with(|| team.clone());
                }
            }
            for alias in &episode.aliases {
                let alias_teams = extract_teams_from_text(alias, &lookup);
                if !episode_teams.is_empty() && alias_teams.len() == episode_teams.len() {
                    for (canonical, alias_team) in episode_teams.iter().zip(alias_teams.iter()) {
                        let token = normalize_token(alias_team);
                        if !token.is_empty() {
                            lookup.entry(token).or_insert_with(|| canonical.clone());
                        }
                    }
                }
                let alias_token = normalize_token(alias);
                if !alias_token.is_empty() {
                    lookup
                        .entry(alias_token)
                        .or_insert_with(|| episode.title.clone());
                }
            }
        }
    }
    lookup
}

fn build_alias_map(entries: &[(&str, &[&str])]) -> HashMap<String, String> {
    let mut mapping = HashMap::new();
    for (canonical, aliases) in entries {
        let canonical = canonical.trim();
        let normalized = normalize_token(canonical);
        if !normalized.is_empty() {
            mapping
                .entry(normalized)
                .or_insert_with(|| canonical.to_string());
        }
        for alias in *aliases {
            let normalized = normalize_token(alias);
            if !normalized.is_empty() {
                mapping
                    .entry(normalized)
                    .or_insert_with(|| canonical.to_string());
            }
        }
    }
    mapping
}

/// Built-in alias table by league name; empty map for unknown names.
pub fn builtin_alias_map(name: &str) -> HashMap<String, String> {
    match name {
        "nhl" => build_alias_map(NHL_TEAMS),
        "nba" => build_alias_map(NBA_TEAMS),
        "premier_league" => build_alias_map(EPL_TEAMS),
        "uefa_champions_league" => build_alias_map(UCL_TEAMS),
        _ => HashMap::new(),
    }
}

/// Merge a sport's configured alias entries over a built-in table.
pub fn configured_alias_map(
    builtin_name: Option<&str>,
    extra: &HashMap<String, Vec<String>>,
) -> HashMap<String, String> {
    let mut mapping = builtin_name.map(builtin_alias_map).unwrap_or_default();
    for (canonical, aliases) in extra {
        let normalized = normalize_token(canonical);
        if !normalized.is_empty() {
            mapping.insert(normalized, canonical.clone());
        }
        for alias in aliases {
            let normalized = normalize_token(alias);
            if !normalized.is_empty() {
                mapping.insert(normalized, canonical.clone());
            }
        }
    }
    mapping
}

const NHL_TEAMS: &[(&str, &[&str])] = &[
    ("Anaheim Ducks", &["Ducks", "Anaheim", "ANA"]),
    ("Boston Bruins", &["Bruins", "Boston", "BOS"]),
    ("Buffalo Sabres", &["Sabres", "Buffalo", "BUF"]),
    ("Calgary Flames", &["Flames", "Calgary", "CGY"]),
    ("Carolina Hurricanes", &["Hurricanes", "Canes", "Carolina", "CAR"]),
    ("Chicago Blackhawks", &["Blackhawks", "Chicago", "Hawks", "CHI"]),
    ("Colorado Avalanche", &["Avalanche", "Avs", "Colorado", "COL"]),
    ("Columbus Blue Jackets", &["Blue Jackets", "Jackets", "Columbus", "CBJ"]),
    ("Dallas Stars", &["Stars", "Dallas", "DAL"]),
    ("Detroit Red Wings", &["Red Wings", "Wings", "Detroit", "DET"]),
    ("Edmonton Oilers", &["Oilers", "Edmonton", "EDM"]),
    ("Florida Panthers", &["Panthers", "Florida", "FLA"]),
    ("Los Angeles Kings", &["LA Kings", "Kings", "Los Angeles", "LA", "LAK"]),
    ("Minnesota Wild", &["Wild", "Minnesota", "MIN"]),
    ("Montreal Canadiens", &["Canadiens", "Habs", "Montreal", "MTL"]),
    ("Nashville Predators", &["Predators", "Preds", "Nashville", "NSH"]),
    ("New Jersey Devils", &["Devils", "New Jersey", "NJ Devils", "NJ", "NJD"]),
    ("New York Islanders", &["Islanders", "NY Islanders", "NYI"]),
    ("New York Rangers", &["Rangers", "NY Rangers", "NYR"]),
    ("Ottawa Senators", &["Senators", "Sens", "Ottawa", "OTT"]),
    ("Philadelphia Flyers", &["Flyers", "Philadelphia", "Philly", "PHI"]),
    ("Pittsburgh Penguins", &["Penguins", "Pens", "Pittsburgh", "PIT"]),
    ("San Jose Sharks", &["Sharks", "San Jose", "SJ Sharks", "SJ", "SJS"]),
    ("Seattle Kraken", &["Kraken", "Seattle", "SEA"]),
    ("St. Louis Blues", &["Saint Louis Blues", "St Louis Blues", "Blues", "St Louis", "STL"]),
    ("Tampa Bay Lightning", &["Lightning", "Bolts", "Tampa", "Tampa Bay", "TBL"]),
    ("Toronto Maple Leafs", &["Maple Leafs", "Leafs", "Toronto", "TOR"]),
    ("Utah Mammoth", &["Mammoth", "Utah", "UTA"]),
    ("Vancouver Canucks", &["Canucks", "Vancouver", "Nucks", "VAN"]),
    ("Vegas Golden Knights", &["Golden Knights", "VGK", "Vegas"]),
    ("Washington Capitals", &["Capitals", "Caps", "Washington", "WSH"]),
    ("Winnipeg Jets", &["Jets", "Winnipeg", "WPG"]),
];

const NBA_TEAMS: &[(&str, &[&str])] = &[
    ("Atlanta Hawks", &["Hawks", "Atlanta", "ATL"]),
    ("Boston Celtics", &["Celtics", "Boston", "BOS"]),
    ("Brooklyn Nets", &["Nets", "Brooklyn", "BKN"]),
    ("Charlotte Hornets", &["Hornets", "Charlotte", "CHA"]),
    ("Chicago Bulls", &["Bulls", "Chicago", "CHI"]),
    ("Cleveland Cavaliers", &["Cavaliers", "Cavs", "Cleveland", "CLE"]),
    ("Dallas Mavericks", &["Mavericks", "Mavs", "Dallas", "DAL"]),
    ("Denver Nuggets", &["Nuggets", "Denver", "DEN"]),
    ("Detroit Pistons", &["Pistons", "Detroit", "DET"]),
    ("Golden State Warriors", &["Warriors", "Golden State", "GSW", "Dubs"]),
    ("Houston Rockets", &["Rockets", "Houston", "HOU"]),
    ("Indiana Pacers", &["Pacers", "Indiana", "IND"]),
    ("Los Angeles Clippers", &["Clippers", "LA Clippers", "LAC"]),
    ("Los Angeles Lakers", &["Lakers", "LA Lakers", "LAL"]),
    ("Memphis Grizzlies", &["Grizzlies", "Memphis", "MEM", "Grizz"]),
    ("Miami Heat", &["Heat", "Miami", "MIA"]),
    ("Milwaukee Bucks", &["Bucks", "Milwaukee", "MIL"]),
    ("Minnesota Timberwolves", &["Timberwolves", "Wolves", "Minnesota", "MIN"]),
    ("New Orleans Pelicans", &["Pelicans", "New Orleans", "NOP", "NOLA"]),
    ("New York Knicks", &["Knicks", "New York", "NYK"]),
    ("Oklahoma City Thunder", &["Thunder", "Oklahoma City", "OKC"]),
    ("Orlando Magic", &["Magic", "Orlando", "ORL"]),
    ("Philadelphia 76ers", &["76ers", "Sixers", "Philadelphia", "PHI", "Philly"]),
    ("Phoenix Suns", &["Suns", "Phoenix", "PHX"]),
    ("Portland Trail Blazers", &["Trail Blazers", "Blazers", "Portland", "POR"]),
    ("Sacramento Kings", &["Kings", "Sacramento", "SAC"]),
    ("San Antonio Spurs", &["Spurs", "San Antonio", "SAS"]),
    ("Toronto Raptors", &["Raptors", "Toronto", "TOR"]),
    ("Utah Jazz", &["Jazz", "Utah", "UTA"]),
    ("Washington Wizards", &["Wizards", "Washington", "WAS"]),
];

const EPL_TEAMS: &[(&str, &[&str])] = &[
    ("Arsenal", &["Arsenal FC", "Gunners", "ARS"]),
    ("Aston Villa", &["Villa", "AVFC", "AVL"]),
    ("Bournemouth", &["AFC Bournemouth", "Cherries", "BOU"]),
    ("Brentford", &["Brentford FC", "BRE"]),
    ("Brighton & Hove Albion", &["Brighton", "Brighton and Hove Albion", "Albion", "BHAFC", "BHA"]),
    ("Burnley", &["Burnley FC", "Clarets", "BUR"]),
    ("Chelsea", &["Chelsea FC", "Blues", "CHE", "CFC"]),
    ("Crystal Palace", &["Palace", "CPFC", "CRY"]),
    ("Everton", &["Everton FC", "Toffees", "EVE", "EFC"]),
    ("Fulham", &["Fulham FC", "Cottagers", "FUL"]),
    ("Leeds United", &["Leeds", "Leeds Utd", "LUFC"]),
    ("Leicester City", &["Leicester", "Foxes", "LCFC", "LEI"]),
    ("Liverpool", &["Liverpool FC", "Reds", "LIV", "LFC"]),
    ("Manchester City", &["Man City", "Manchester C", "MCFC", "MCI"]),
    ("Manchester United", &["Man United", "Man Utd", "MUFC", "MUN", "Man U"]),
    ("Newcastle United", &["Newcastle", "Magpies", "NUFC"]),
    ("Nottingham Forest", &["Nottingham", "Forest", "NFFC", "NOT"]),
    ("Southampton", &["Saints", "Southampton FC", "SOU"]),
    ("Sunderland", &["SAFC", "Sunderland AFC", "Black Cats", "SUN"]),
    ("Tottenham Hotspur", &["Spurs", "Tottenham", "THFC", "TOT"]),
    ("West Ham United", &["West Ham", "Hammers", "WHU", "WHFC"]),
    ("Wolverhampton Wanderers", &["Wolves", "Wolverhampton", "WWFC", "WOL"]),
];

const UCL_TEAMS: &[(&str, &[&str])] = &[
    ("Real Madrid", &["Real", "RMA", "Los Blancos", "Madrid"]),
    ("Barcelona", &["Barca", "Blaugrana", "FC Barcelona"]),
    ("Atlético Madrid", &["Atletico Madrid", "Atletico", "Atleti", "ATM"]),
    ("Bayern Munich", &["Bayern", "Bayern Munchen", "FC Bayern", "BAY"]),
    ("Borussia Dortmund", &["Dortmund", "BVB", "Borussia", "DOR"]),
    ("RB Leipzig", &["Leipzig", "RBL", "Red Bull Leipzig"]),
    ("Bayer Leverkusen", &["Leverkusen", "Bayer 04", "B04", "LEV"]),
    ("Inter Milan", &["Inter", "Internazionale", "INT"]),
    ("AC Milan", &["Milan", "Rossoneri", "ACM"]),
    ("Juventus", &["Juve", "JUV", "Bianconeri"]),
    ("Napoli", &["SSC Napoli", "NAP"]),
    ("Manchester City", &["Man City", "City", "MCFC", "MCI"]),
    ("Liverpool", &["Liverpool FC", "LIV", "LFC"]),
    ("Chelsea", &["Chelsea FC", "CHE", "CFC"]),
    ("Arsenal", &["Arsenal FC", "ARS", "Gunners"]),
    ("Paris Saint-Germain", &["PSG", "Paris", "Paris SG"]),
    ("Monaco", &["AS Monaco", "ASM", "MON"]),
    ("Marseille", &["Olympique Marseille", "OM"]),
    ("Benfica", &["SL Benfica", "BEN"]),
    ("Porto", &["FC Porto", "Dragoes", "POR"]),
    ("Sporting CP", &["Sporting Lisbon", "Sporting", "SCP"]),
    ("Ajax", &["AFC Ajax", "Ajax Amsterdam", "AJA"]),
    ("PSV Eindhoven", &["PSV"]),
    ("Feyenoord", &["Feyenoord Rotterdam", "FEY"]),
    ("Celtic", &["Celtic FC", "Glasgow Celtic", "CEL"]),
    ("Galatasaray", &["Gala", "GAL"]),
    ("Copenhagen", &["FC Copenhagen", "FCK"]),
    ("Red Star Belgrade", &["Crvena Zvezda", "Red Star", "RSB"]),
    ("Olympiacos", &["Olympiakos", "OLY"]),
    ("Slavia Prague", &["Slavia Praha", "SLA"]),
    ("Sparta Prague", &["Sparta Praha", "SPP"]),
];
