use crate::{
    pokemon::{Ability, CardRecord, Skill},
    Crawler, CrawlerResult, Request,
};
use itertools::Itertools;
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use tracing::{error, warn};
use url::Url;

/// Search results, `{page}` is the 1-based page number. Filters are left at
/// their widest values.
pub const LISTING_URL: &str = "https://www.pokemon.com/us/pokemon-tcg/pokemon-cards/{page}?cardName=&cardText=&evolvesFrom=&simpleSubmit=&format=unlimited&hitPointsMin=0&hitPointsMax=340&retreatCostMin=0&retreatCostMax=5&totalAttackCostMin=0&totalAttackCostMax=5&particularArtist=";

const STAR_MARKER: char = '*';

const E: &str = "Invalid selector";
lazy_static! {
    static ref CARD_LINK: Selector =
        Selector::parse(r#"ul[id="cardResults"] > li > a[href]"#).expect(E);

    static ref TITLE: Selector = Selector::parse("h1").expect(E);
    static ref STAR: Selector = Selector::parse("h1 > img[alt]").expect(E);
    static ref CARD_TYPE: Selector = Selector::parse(r#"div[class="card-type"] > h2"#).expect(E);
    static ref HP: Selector = Selector::parse(r#"span[class="card-hp"]"#).expect(E);
    static ref POKEMON_TYPE: Selector = Selector::parse(
        r#"div[class="card-basic-info"] > div[class="right"] > a > i[title]"#
    )
    .expect(E);
    static ref EVOLVES_FROM: Selector =
        Selector::parse(r#"div[class="card-basic-info"] > div > h4 > a"#).expect(E);
    static ref EXPANSION: Selector =
        Selector::parse(r#"div[class="stats-footer"] > h3 > a"#).expect(E);
    static ref NAME: Selector = Selector::parse(r#"div[class="stats-footer"] > span"#).expect(E);
    static ref ILLUSTRATOR: Selector =
        Selector::parse(r#"div[class*="illustrator"] > h4 > a"#).expect(E);

    static ref POKE_BODY: Selector = Selector::parse(r#"h3 > div[class="poke-body"]"#).expect(E);
    static ref POKE_POWER: Selector = Selector::parse(r#"h3 > div[class="poke-power"]"#).expect(E);
    static ref ABILITIES_HEADING: Selector =
        Selector::parse(r#"div[class="pokemon-abilities"] > h3"#).expect(E);
    static ref ABILITIES_TEXT: Selector =
        Selector::parse(r#"div[class="pokemon-abilities"] > p"#).expect(E);

    static ref SKILL: Selector = Selector::parse(r#"div[class="ability"]"#).expect(E);
    static ref POKE_ABILITY: Selector =
        Selector::parse(r#"h3 > div[class="poke-ability"]"#).expect(E);
    static ref COST: Selector = Selector::parse("ul > li").expect(E);
    static ref H4: Selector = Selector::parse("h4").expect(E);
    static ref DAMAGE: Selector = Selector::parse(r#"span[class*="right"]"#).expect(E);
    static ref P: Selector = Selector::parse("p").expect(E);

    static ref STATS: Selector =
        Selector::parse(r#"div[class="pokemon-stats"] > div[class*="stat"]"#).expect(E);

    static ref LISTING_BASE: Url =
        Url::parse(&LISTING_URL.replace("{page}", "1")).expect("Invalid listing url");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Listing,
    Card,
}

/// Paginates the card search and extracts one [`CardRecord`] per detail page.
#[derive(Debug)]
pub struct TcgCrawler {
    pages: u32,
}

/// Text of the element and all its descendants, markup dropped.
fn remove_tags(el: ElementRef) -> String {
    el.text().collect()
}

/// First text node directly under `el`.
fn own_text(el: ElementRef) -> Option<String> {
    el.children()
        .find_map(|node| node.value().as_text().map(|text| text.to_string()))
}

fn first_own_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector).find_map(own_text)
}

fn has_marker(doc: &Html, marker: &Selector) -> bool {
    doc.select(marker).any(|el| own_text(el).is_some())
}

impl TcgCrawler {
    pub fn new(pages: u32) -> Self {
        Self { pages }
    }

    pub fn listing_url(&self, page: u32) -> Url {
        let mut url = LISTING_BASE.clone();
        url.set_path(&format!("/us/pokemon-tcg/pokemon-cards/{}", page));
        url
    }

    pub fn extract_links(&self, url: &Url, doc: &Html) -> Vec<Request<PageKind>> {
        doc.select(&CARD_LINK)
            .filter_map(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .filter_map(|href| match url.join(href) {
                Ok(link) => Some(link),
                Err(e) => {
                    warn!("Skip card link {:?} on {}: {}", href, url, e);
                    None
                }
            })
            .map(|link| Request::new(link, PageKind::Card))
            .collect()
    }

    pub fn extract_card(&self, url: &Url, doc: &Html) -> CardRecord {
        let pokemon_type = doc
            .select(&POKEMON_TYPE)
            .find_map(|el| el.value().attr("title"))
            .map(ToString::to_string);

        let evolves_from = doc
            .select(&EVOLVES_FROM)
            .next()
            .map(|a| remove_tags(a).trim().to_string());

        let skills = doc.select(&SKILL).map(extract_skill).collect();

        let [weakness, resistance, retreat_cost] = extract_stats(doc);

        CardRecord {
            title: extract_title(url, doc),
            card_type: first_own_text(doc, &CARD_TYPE),
            hp: first_own_text(doc, &HP),
            pokemon_type,
            evolves_from,
            skills,
            expansion: first_own_text(doc, &EXPANSION),
            name: first_own_text(doc, &NAME),
            illustrator: first_own_text(doc, &ILLUSTRATOR),
            poke_body: extract_ability(doc, &POKE_BODY),
            poke_power: extract_ability(doc, &POKE_POWER),
            weakness,
            resistance,
            retreat_cost,
        }
    }
}

fn extract_title(url: &Url, doc: &Html) -> Option<String> {
    let Some(heading) = doc.select(&TITLE).next() else {
        error!("Card page {} has no title heading", url);
        return None;
    };

    let mut title = remove_tags(heading);
    if doc.select(&STAR).next().is_some() {
        title.push(STAR_MARKER);
    }
    Some(title)
}

// Body and power sections are read from the same heading and paragraph, only
// the marker differs.
fn extract_ability(doc: &Html, marker: &Selector) -> Option<Ability> {
    if !has_marker(doc, marker) {
        return None;
    }

    let name = doc.select(&ABILITIES_HEADING).find_map(|h3| {
        h3.children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "div")
            .nth(1)
            .and_then(own_text)
    });
    let description = doc.select(&ABILITIES_TEXT).next().map(remove_tags);

    Some(Ability { name, description })
}

fn extract_skill(skill: ElementRef) -> Skill {
    let is_ability = skill.select(&POKE_ABILITY).any(|el| own_text(el).is_some());

    let skill_cost = skill
        .select(&COST)
        .filter_map(|li| li.value().attr("title"))
        .map(ToString::to_string)
        .collect();

    let skill_text = skill
        .children()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "pre")
        .or_else(|| skill.select(&P).next())
        .map(remove_tags);

    Skill {
        is_ability,
        skill_cost,
        skill_name: skill.select(&H4).next().map(remove_tags),
        skill_damage: skill.select(&DAMAGE).find_map(own_text),
        skill_text,
    }
}

/// Weakness, resistance and retreat cost, in that order. Extra blocks are ignored.
fn extract_stats(doc: &Html) -> [Option<String>; 3] {
    let mut stats: [Option<String>; 3] = Default::default();
    for (slot, stat) in stats.iter_mut().zip(doc.select(&STATS)) {
        let cost = stat
            .select(&COST)
            .filter_map(|li| li.value().attr("title"))
            .join(" ");
        let text = stat.select(&COST).find_map(own_text).unwrap_or_default();
        *slot = Some(format!("{}{}", cost, text).trim().to_string());
    }
    stats
}

impl Crawler for TcgCrawler {
    type Kind = PageKind;
    type Document = CardRecord;

    fn start_requests(&self) -> Vec<Request<PageKind>> {
        (1..=self.pages)
            .map(|page| Request::new(self.listing_url(page), PageKind::Listing))
            .collect()
    }

    fn crawl(&self, kind: PageKind, url: &Url, doc: &Html) -> CrawlerResult<PageKind, CardRecord> {
        match kind {
            PageKind::Listing => CrawlerResult::Links(self.extract_links(url, doc)),
            PageKind::Card => CrawlerResult::Document(self.extract_card(url, doc)),
        }
    }
}
