//! Synthetic market universe: instruments, users, holdings and competitions.
//!
//! Every value is a function of the clamped [`MockConfig`] and the PRNG stream
//! seeded with `config.seed`. Calling [`generate`] twice with the same config
//! yields field-for-field identical output.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::info;

use crate::config::MockConfig;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use crate::prng::{hex_token, log_uniform, signed, Prng};

const SYMBOL_SPACE: usize = 26 * 26 * 26;
const SYMBOL_STRIDE: usize = 7_919;
const SYMBOL_OFFSET: usize = 4_231;

const PRICE_SERIES_SALT: u32 = 1;
const HOLDER_SERIES_SALT: u32 = 2;

const PRICE_RANGE: (f64, f64) = (1e-6, 5e4);
const MARKET_CAP_RANGE: (f64, f64) = (1e5, 5e11);
const HOLDERS_RANGE: (f64, f64) = (100.0, 5e6);
const VOLUME_RANGE: (f64, f64) = (1e3, 5e9);
const DISPLAY_JITTER: f64 = 0.05;
const DAILY_PRICE_STEP: f64 = 0.04;
const DAILY_HOLDER_NOISE: f64 = 0.002;
const RETURN_SCALE_24H: f64 = 8.0;
const RETURN_SCALE_7D: f64 = 20.0;
const RETURN_SCALE_30D: f64 = 45.0;
const HOLDER_GROWTH_SCALE: f64 = 6.0;
const MAX_LISTED_DAYS_AGO: u32 = 720;
const TRADING_DAYS_PER_YEAR: f64 = 365.0;

const USER_POOL_SIZE: usize = 8;

const NAME_STEMS: [&str; 16] = [
    "Aurora", "Basalt", "Cinder", "Drift", "Ember", "Fable", "Glacier", "Harbor", "Ion", "Jade",
    "Kite", "Lumen", "Mosaic", "Nimbus", "Orbit", "Prism",
];
const NAME_SUFFIXES: [&str; 8] = [
    "Coin", "Protocol", "Finance", "Network", "Swap", "Labs", "Chain", "Inu",
];
const USER_NAMES: [&str; USER_POOL_SIZE] = [
    "Alice", "Bob", "Carol", "Dave", "Eve", "Mallory", "Trent", "Peggy",
];
const USER_BIOS: [&str; 6] = [
    "Loves memecoins and DeFi.",
    "On-chain sleuth.",
    "Yield farmer.",
    "Market maker.",
    "Bot enjoyer.",
    "Diamond hands since genesis.",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instrument {
    pub id: u32,
    pub symbol: String,
    pub name: String,
    pub price_usd: f64,
    pub market_cap_usd: u64,
    pub volume_24h_usd: f64,
    pub holders_count: u64,
    pub change_24h: f64,
    pub change_7d: f64,
    pub change_30d: f64,
    pub sharpe: f64,
    pub holder_growth: f64,
    pub score: f64,
    pub listed_days_ago: u32,
    pub series_seed: u32,
    pub sparkline: Vec<f64>,
    pub holders_series: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyntheticUser {
    pub npub: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub joined_days_ago: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub user: usize,
    pub instrument: usize,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompetitionEntry {
    pub user: usize,
    pub score: f64,
    pub rank: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Competition {
    pub slug: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub start_offset_days: i64,
    pub end_offset_days: i64,
    pub entries: Vec<CompetitionEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub config: MockConfig,
    pub instruments: Vec<Instrument>,
    pub users: Vec<SyntheticUser>,
    pub holdings: Vec<Holding>,
    pub competitions: Vec<Competition>,
    symbol_index: HashMap<String, usize>,
}

impl Dataset {
    pub fn instrument(&self, symbol: &str) -> Option<&Instrument> {
        self.symbol_index
            .get(&symbol.to_ascii_uppercase())
            .and_then(|&idx| self.instruments.get(idx))
    }

    pub fn instrument_index(&self, symbol: &str) -> Option<usize> {
        self.symbol_index.get(&symbol.to_ascii_uppercase()).copied()
    }

    pub fn user_by_npub(&self, npub: &str) -> Option<(usize, &SyntheticUser)> {
        self.users
            .iter()
            .enumerate()
            .find(|(_, user)| user.npub.eq_ignore_ascii_case(npub))
    }

    pub fn competition(&self, slug: &str) -> Option<&Competition> {
        self.competitions.iter().find(|comp| comp.slug == slug)
    }

    pub fn amplitude(&self) -> f64 {
        self.config.volatility.amplitude()
    }

    pub fn window_points(&self, days: u32) -> usize {
        if days == 0 {
            self.config.series_days as usize + 1
        } else {
            days as usize + 1
        }
    }

    pub fn price_window(&self, instrument: &Instrument, points: usize) -> Vec<f64> {
        if points <= instrument.sparkline.len() {
            instrument.sparkline[instrument.sparkline.len() - points..].to_vec()
        } else {
            price_series(
                instrument.series_seed,
                instrument.price_usd,
                points,
                self.amplitude(),
            )
        }
    }

    pub fn holders_window(&self, instrument: &Instrument, points: usize) -> Vec<u64> {
        if points <= instrument.holders_series.len() {
            instrument.holders_series[instrument.holders_series.len() - points..].to_vec()
        } else {
            holder_series(
                instrument.series_seed,
                instrument.holders_count,
                instrument.holder_growth,
                points,
            )
        }
    }

    pub fn holdings_for_user(&self, user: usize) -> impl Iterator<Item = &Holding> {
        self.holdings.iter().filter(move |h| h.user == user)
    }

    pub fn holdings_for_instrument(&self, instrument: usize) -> impl Iterator<Item = &Holding> {
        self.holdings.iter().filter(move |h| h.instrument == instrument)
    }
}

pub fn generate(config: &MockConfig) -> Dataset {
    let config = config.clone().clamped();
    let amplitude = config.volatility.amplitude();
    let mut rng = Prng::new(config.seed);

    let instruments: Vec<Instrument> = (0..config.size)
        .map(|idx| generate_instrument(&mut rng, idx, config.series_days, amplitude))
        .collect();
    let users = generate_users(&mut rng);
    let holdings = generate_holdings(&mut rng, users.len(), instruments.len());
    let competitions = generate_competitions(&mut rng, &instruments, &holdings, users.len());

    let symbol_index = instruments
        .iter()
        .enumerate()
        .map(|(idx, inst)| (inst.symbol.clone(), idx))
        .collect();

    info!(
        component = "dataset",
        event = "dataset.generate",
        seed = config.seed,
        size = instruments.len(),
        volatility = config.volatility.as_str(),
        series_days = config.series_days,
        users = users.len(),
        holdings = holdings.len()
    );

    Dataset {
        config,
        instruments,
        users,
        holdings,
        competitions,
        symbol_index,
    }
}

// Bijective scramble of the index: unique below 17576 and independent of the seed.
pub fn symbol_for_index(idx: usize) -> String {
    let mut code = (idx % SYMBOL_SPACE * SYMBOL_STRIDE + SYMBOL_OFFSET) % SYMBOL_SPACE;
    let mut letters = [b'A'; 3];
    for slot in letters.iter_mut().rev() {
        *slot = b'A' + (code % 26) as u8;
        code /= 26;
    }
    letters.iter().map(|&b| b as char).collect()
}

fn generate_instrument(rng: &mut Prng, idx: usize, series_days: u32, amplitude: f64) -> Instrument {
    let symbol = symbol_for_index(idx);
    let stem = NAME_STEMS.choose(rng).copied().unwrap_or("Token");
    let suffix = NAME_SUFFIXES.choose(rng).copied().unwrap_or("Coin");
    let name = format!("{stem} {suffix}");

    let base_price = log_uniform(rng, PRICE_RANGE.0, PRICE_RANGE.1);
    let price_usd = base_price * (1.0 + signed(rng, DISPLAY_JITTER * amplitude));
    let market_cap_usd = log_uniform(rng, MARKET_CAP_RANGE.0, MARKET_CAP_RANGE.1).round().max(1.0) as u64;
    let holders_count = log_uniform(rng, HOLDERS_RANGE.0, HOLDERS_RANGE.1).round().max(1.0) as u64;
    let volume_24h_usd = log_uniform(rng, VOLUME_RANGE.0, VOLUME_RANGE.1);

    let change_24h = signed(rng, RETURN_SCALE_24H * amplitude);
    let change_7d = signed(rng, RETURN_SCALE_7D * amplitude);
    let change_30d = signed(rng, RETURN_SCALE_30D * amplitude);
    let holder_growth = signed(rng, HOLDER_GROWTH_SCALE * amplitude);
    let listed_days_ago = rng.gen_range(1..=MAX_LISTED_DAYS_AGO);
    let series_seed = rng.next_u32();

    let points = series_days as usize + 1;
    let sparkline = price_series(series_seed, price_usd, points, amplitude);
    let holders_series = holder_series(series_seed, holders_count, holder_growth, points);
    let sharpe = sharpe_ratio(&sparkline);
    let score = composite_score(change_7d, holder_growth, sharpe);

    Instrument {
        id: idx as u32 + 1,
        symbol,
        name,
        price_usd,
        market_cap_usd,
        volume_24h_usd,
        holders_count,
        change_24h,
        change_7d,
        change_30d,
        sharpe,
        holder_growth,
        score,
        listed_days_ago,
        series_seed,
        sparkline,
        holders_series,
    }
}

// Walked backwards from `anchor`; the k-th step back depends only on `series_seed` and k.
pub fn price_series(series_seed: u32, anchor: f64, points: usize, amplitude: f64) -> Vec<f64> {
    let mut rng = Prng::for_stream(series_seed, PRICE_SERIES_SALT);
    let step = DAILY_PRICE_STEP * amplitude;
    let mut out = vec![0.0; points];
    let mut price = anchor;
    for slot in out.iter_mut().rev() {
        *slot = price;
        price /= 1.0 + signed(&mut rng, step);
    }
    out
}

pub fn holder_series(series_seed: u32, anchor: u64, growth_30d_pct: f64, points: usize) -> Vec<u64> {
    let mut rng = Prng::for_stream(series_seed, HOLDER_SERIES_SALT);
    let daily_drift = (1.0 + growth_30d_pct / 100.0).max(0.01).powf(1.0 / 30.0) - 1.0;
    let mut out = vec![0; points];
    let mut holders = anchor as f64;
    for slot in out.iter_mut().rev() {
        *slot = holders.round().max(1.0) as u64;
        holders /= 1.0 + daily_drift + signed(&mut rng, DAILY_HOLDER_NOISE);
    }
    out
}

pub fn sharpe_ratio(prices: &[f64]) -> f64 {
    if prices.len() < 3 {
        return f64::NAN;
    }
    let returns: Vec<f64> = prices.windows(2).map(|w| w[1] / w[0] - 1.0).collect();
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stdev = variance.sqrt();
    if stdev <= f64::EPSILON {
        return f64::NAN;
    }
    mean / stdev * TRADING_DAYS_PER_YEAR.sqrt()
}

pub fn composite_score(change_7d: f64, holder_growth: f64, sharpe: f64) -> f64 {
    0.5 * change_7d + 0.3 * holder_growth + 2.0 * sharpe.clamp(-5.0, 5.0)
}

fn generate_users(rng: &mut Prng) -> Vec<SyntheticUser> {
    USER_NAMES
        .iter()
        .map(|name| {
            let npub = hex_token(rng, 32);
            let bio = USER_BIOS.choose(rng).map(|b| (*b).to_string());
            let avatar_url = Some(format!("/static/avatars/demo-{}.svg", &npub[..8]));
            let joined_days_ago = rng.gen_range(1..=400);
            SyntheticUser {
                npub,
                display_name: Some((*name).to_string()),
                avatar_url,
                bio,
                joined_days_ago,
            }
        })
        .collect()
}

fn generate_holdings(rng: &mut Prng, user_count: usize, instrument_count: usize) -> Vec<Holding> {
    let mut holdings = Vec::new();
    if instrument_count == 0 {
        return holdings;
    }
    let max_pick = instrument_count.min(8);

    for user in 0..user_count {
        let wanted = rng.gen_range(3.min(max_pick)..=max_pick);
        let mut taken = HashSet::new();
        while taken.len() < wanted {
            let instrument = rng.gen_range(0..instrument_count);
            if taken.insert(instrument) {
                holdings.push(Holding {
                    user,
                    instrument,
                    quantity: log_uniform(rng, 0.01, 500.0),
                });
            }
        }
    }
    holdings
}

fn generate_competitions(
    rng: &mut Prng,
    instruments: &[Instrument],
    holdings: &[Holding],
    user_count: usize,
) -> Vec<Competition> {
    let value_of = |h: &Holding| h.quantity * instruments[h.instrument].price_usd;

    let gains: Vec<f64> = (0..user_count)
        .map(|user| {
            let (value, weighted) = holdings
                .iter()
                .filter(|h| h.user == user)
                .fold((0.0, 0.0), |(v, w), h| {
                    let value = value_of(h);
                    (v + value, w + value * instruments[h.instrument].change_7d)
                });
            let pct = if value > 0.0 { weighted / value } else { 0.0 };
            pct * (1.0 + rng.gen_range(-0.1..0.25))
        })
        .collect();

    let totals: Vec<f64> = (0..user_count)
        .map(|user| {
            let value: f64 = holdings.iter().filter(|h| h.user == user).map(value_of).sum();
            value * (1.0 + rng.gen_range(-0.1..0.25))
        })
        .collect();

    vec![
        Competition {
            slug: "battle-of-gains",
            title: "Battle of Gains",
            description: "Highest portfolio % gains over the period.",
            start_offset_days: -7,
            end_offset_days: 7,
            entries: ranked(gains),
        },
        Competition {
            slug: "holders-cup",
            title: "Hodlers' Cup",
            description: "Largest holdings value wins.",
            start_offset_days: -3,
            end_offset_days: 10,
            entries: ranked(totals),
        },
    ]
}

fn ranked(scores: Vec<f64>) -> Vec<CompetitionEntry> {
    let mut entries: Vec<CompetitionEntry> = scores
        .into_iter()
        .enumerate()
        .map(|(user, score)| CompetitionEntry {
            user,
            score,
            rank: 0,
        })
        .collect();
    entries.sort_by(|a, b| b.score.total_cmp(&a.score));
    for (pos, entry) in entries.iter_mut().enumerate() {
        entry.rank = pos as u32 + 1;
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Volatility;

    fn cfg(seed: u32, size: usize) -> MockConfig {
        MockConfig {
            seed,
            size,
            ..MockConfig::default()
        }
    }

    #[test]
    fn generation_is_bit_identical_for_same_config() {
        let a = generate(&cfg(1337, 200));
        let b = generate(&cfg(1337, 200));

        assert_eq!(a.instruments.len(), 200);
        for (x, y) in a.instruments.iter().zip(&b.instruments) {
            assert_eq!(x.price_usd.to_bits(), y.price_usd.to_bits());
            assert_eq!(x.sharpe.to_bits(), y.sharpe.to_bits());
            assert_eq!(x.sparkline, y.sparkline);
        }
        assert_eq!(a.users, b.users);
        assert_eq!(a.holdings, b.holdings);
        assert_eq!(a.competitions, b.competitions);
    }

    #[test]
    fn different_seed_changes_content_but_not_symbols() {
        let a = generate(&cfg(1, 50));
        let b = generate(&cfg(2, 50));

        let symbols_a: Vec<&str> = a.instruments.iter().map(|i| i.symbol.as_str()).collect();
        let symbols_b: Vec<&str> = b.instruments.iter().map(|i| i.symbol.as_str()).collect();
        assert_eq!(symbols_a, symbols_b);
        assert_ne!(a.instruments[0].price_usd, b.instruments[0].price_usd);
    }

    #[test]
    fn symbols_are_unique_three_letter_tickers() {
        let symbols: HashSet<String> = (0..5_000).map(symbol_for_index).collect();
        assert_eq!(symbols.len(), 5_000);
        assert!(symbols
            .iter()
            .all(|s| s.len() == 3 && s.chars().all(|c| c.is_ascii_uppercase())));
    }

    #[test]
    fn out_of_range_size_is_clamped_before_generation() {
        assert_eq!(generate(&cfg(3, 0)).instruments.len(), crate::config::MIN_SIZE);
        assert_eq!(
            generate(&cfg(3, 1_000_000)).instruments.len(),
            crate::config::MAX_SIZE
        );
    }

    #[test]
    fn numeric_fields_are_positive_and_series_end_at_current_values() {
        let ds = generate(&cfg(77, 100));
        for inst in &ds.instruments {
            assert!(inst.price_usd > 0.0);
            assert!(inst.market_cap_usd > 0);
            assert!(inst.holders_count > 0);
            assert!(inst.volume_24h_usd > 0.0);
            assert_eq!(inst.sparkline.len(), ds.config.series_days as usize + 1);
            assert_eq!(inst.holders_series.len(), inst.sparkline.len());
            assert_eq!(*inst.sparkline.last().unwrap(), inst.price_usd);
            assert_eq!(*inst.holders_series.last().unwrap(), inst.holders_count);
        }
    }

    #[test]
    fn short_windows_slice_and_long_windows_extend_the_same_tail() {
        let ds = generate(&MockConfig {
            series_days: 30,
            ..cfg(5, 20)
        });
        let inst = &ds.instruments[3];

        let week = ds.price_window(inst, ds.window_points(7));
        assert_eq!(week.len(), 8);
        assert_eq!(week[..], inst.sparkline[inst.sparkline.len() - 8..]);

        let long = ds.price_window(inst, ds.window_points(90));
        assert_eq!(long.len(), 91);
        assert_eq!(long[long.len() - 31..], inst.sparkline[..]);

        let holders = ds.holders_window(inst, 91);
        assert_eq!(holders.len(), 91);
        assert_eq!(holders[holders.len() - 31..], inst.holders_series[..]);
    }

    #[test]
    fn higher_volatility_widens_returns() {
        let spread = |volatility| {
            let ds = generate(&MockConfig {
                volatility,
                ..cfg(11, 500)
            });
            ds.instruments
                .iter()
                .map(|i| i.change_30d.abs())
                .fold(0.0_f64, f64::max)
        };

        let calm = spread(Volatility::Calm);
        let degen = spread(Volatility::Degen);
        assert!(calm <= 45.0 * 0.5);
        assert!(degen > calm);
    }

    #[test]
    fn returns_are_not_biased_in_sign() {
        let ds = generate(&cfg(21, 2_000));
        let positive = ds.instruments.iter().filter(|i| i.change_24h > 0.0).count();
        let share = positive as f64 / ds.instruments.len() as f64;
        assert!((0.45..0.55).contains(&share), "positive share {share}");
    }

    #[test]
    fn users_holdings_and_competitions_are_consistent() {
        let ds = generate(&cfg(8, 60));
        assert_eq!(ds.users.len(), USER_POOL_SIZE);
        for user in 0..ds.users.len() {
            let held: Vec<_> = ds.holdings_for_user(user).collect();
            assert!((3..=8).contains(&held.len()));
            let distinct: HashSet<usize> = held.iter().map(|h| h.instrument).collect();
            assert_eq!(distinct.len(), held.len());
        }

        let cup = ds.competition("holders-cup").unwrap();
        assert_eq!(cup.entries.len(), USER_POOL_SIZE);
        assert_eq!(cup.entries[0].rank, 1);
        assert!(cup.entries.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(ds.competition("missing").is_none());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let ds = generate(&cfg(1, 10));
        let symbol = ds.instruments[4].symbol.to_ascii_lowercase();
        assert_eq!(ds.instrument(&symbol).unwrap().id, 5);

        let npub = ds.users[2].npub.to_ascii_uppercase();
        assert_eq!(ds.user_by_npub(&npub).unwrap().0, 2);
    }

    #[test]
    fn sharpe_is_nan_for_flat_or_short_series() {
        assert!(sharpe_ratio(&[1.0, 1.0, 1.0, 1.0]).is_nan());
        assert!(sharpe_ratio(&[1.0]).is_nan());
        assert!(sharpe_ratio(&[1.0, 1.1, 1.05, 1.2]).is_finite());
    }
}
