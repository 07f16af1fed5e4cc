use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

use crate::dates::parse_datestamp;
use crate::encoding;
use crate::errors::{LedgerError, Location, Result};
use crate::format::{
    decimal_places, decimal_places_str, format_amount, parse_number, truncate_floating_point,
    DecimalSeparator,
};
use crate::models::{
    is_close, sort_canonically, Amount, Directive, Distribution, EntryAttributes, Positioning,
    Transaction, POSITION_TOLERANCE,
};
use crate::records::tickers;
use crate::transform::removing_redundancies;

// The journal reader. Journals are line-oriented; any line beginning with a
// date starts a new entry and subsequent non-date lines belong to it. A `#`
// starts a comment running to the end of the line, and a `;` starts a
// whitespace-separated tag region. `include <path>` splices another journal
// in at the directive site.

lazy_static! {
    // lines beginning with anything date-like start a new entry; proper
    // validation happens in parse_datestamp afterwards
    static ref ENTRY_START: Regex = Regex::new(r"^[0-9]+[-/.][0-9]+[-/.][0-9]+").unwrap();
    static ref BRACKETED: Regex = Regex::new(r"\[(.*)\]").unwrap();
}

/// Read a journal file into normalized records, excluding redundant
/// positional entries.
pub fn read(path: &Path, separator: DecimalSeparator) -> Result<Vec<Transaction>> {
    Ok(removing_redundancies(parse_journal(path, separator)?))
}

/// Read a journal file into normalized records.
pub fn parse_journal(path: &Path, separator: DecimalSeparator) -> Result<Vec<Transaction>> {
    let mut entries = Vec::new();
    let mut stack = Vec::new();
    collect_entries(path, separator, &mut stack, &mut entries)?;

    let mut raw = Vec::with_capacity(entries.len());
    for entry in &entries {
        raw.push(parse_entry(entry, separator)?);
    }

    normalize(raw)
}

struct RawEntry {
    location: Location,
    segments: Vec<String>,
    tags: Vec<String>,
}

fn collect_entries(
    path: &Path,
    separator: DecimalSeparator,
    stack: &mut Vec<PathBuf>,
    entries: &mut Vec<RawEntry>,
) -> Result<()> {
    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    stack.push(canonical);

    let text = encoding::read_to_string(path)?;
    let mut current: Option<RawEntry> = None;

    for (index, raw_line) in text.lines().enumerate() {
        let line_number = index + 1;

        // strip any comment
        let mut line = raw_line;
        if let Some(i) = line.find('#') {
            line = &line[..i];
        }

        // split off the tag region
        let mut line_tags: Vec<String> = Vec::new();
        if let Some(i) = line.find(';') {
            line_tags = line[i + 1..]
                .split_whitespace()
                .map(str::to_string)
                .collect();
            line = &line[..i];
        }

        let content = line.trim();

        if ENTRY_START.is_match(content) {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(RawEntry {
                location: Location::new(path, line_number),
                segments: vec![content.to_string()],
                tags: line_tags,
            });
            continue;
        }

        if let Some(directive) = content.strip_prefix("include") {
            let include_path = match path.parent() {
                Some(parent) => parent.join(directive.trim()),
                None => PathBuf::from(directive.trim()),
            };
            let include_canonical =
                fs::canonicalize(&include_path).unwrap_or_else(|_| include_path.clone());
            if stack.contains(&include_canonical) {
                return Err(LedgerError::parse(
                    path,
                    line_number,
                    "attempt to recursively include journal",
                ));
            }
            collect_entries(&include_path, separator, stack, entries)?;
            continue;
        }

        if content.is_empty() && line_tags.is_empty() {
            continue;
        }

        // content prior to the first dated entry is ignored
        if let Some(entry) = current.as_mut() {
            if !content.is_empty() {
                entry.segments.push(content.to_string());
            }
            entry.tags.extend(line_tags);
        }
    }

    if let Some(entry) = current.take() {
        entries.push(entry);
    }

    stack.pop();
    Ok(())
}

fn parse_entry(entry: &RawEntry, separator: DecimalSeparator) -> Result<Transaction> {
    let location = &entry.location;
    let parse_error =
        |reason: String| LedgerError::parse(&location.path, location.line, reason);

    // combine all lines into a single string, with a double-space standing
    // in for each linebreak
    let condensed = entry.segments.join("  ");
    let condensed = condensed.trim();

    let datestamp_end = condensed
        .find(char::is_whitespace)
        .ok_or_else(|| parse_error("invalid transaction".to_string()))?;
    let datestamp = &condensed[..datestamp_end];
    let entry_date = parse_datestamp(datestamp, true)
        .map_err(|_| parse_error(format!("invalid date format ('{datestamp}')")))?;

    let mut rest = condensed[datestamp_end..].trim();

    // the ticker ends at the first position spec, secondary date or double
    // space; a position spec must be the component directly after the ticker
    let break_index = ["(", "[", "  "]
        .iter()
        .filter_map(|s| rest.find(s))
        .min()
        .ok_or_else(|| parse_error("invalid transaction".to_string()))?;

    let mut kind = Distribution::Final;
    let mut ticker = rest[..break_index].trim();
    if let Some(stripped) = ticker.strip_prefix('*') {
        kind = Distribution::Special;
        ticker = stripped.trim();
    } else if let Some(stripped) = ticker.strip_prefix('^') {
        kind = Distribution::Interim;
        ticker = stripped.trim();
    }
    rest = rest[break_index..].trim();

    if ticker.is_empty() {
        return Err(parse_error("invalid ticker format".to_string()));
    }

    let mut positioning = Positioning::set(None);
    if let Some(close) = rest.find(')') {
        let mut spec = rest[..close + 1].trim();
        spec = spec.strip_prefix('(').unwrap_or(spec);
        spec = spec.strip_suffix(')').unwrap_or(spec);
        let spec = spec.trim();

        let (value_str, directive) = if let Some(stripped) = spec.strip_prefix('+') {
            (stripped, Directive::Add)
        } else if let Some(stripped) = spec.strip_prefix('-') {
            (stripped, Directive::Sub)
        } else if let Some(stripped) = spec.strip_prefix('x') {
            match stripped.strip_suffix('!') {
                Some(stripped) => (stripped, Directive::SplitWhole),
                None => (stripped, Directive::Split),
            }
        } else {
            (spec, Directive::Set)
        };

        let value = parse_number(value_str, separator)
            .ok_or_else(|| parse_error(format!("invalid position ('{value_str}')")))?;
        positioning = Positioning {
            value: Some(value),
            directive,
        };
        rest = rest[close + 1..].trim();
    }

    let attributes = EntryAttributes::new(location.clone(), positioning);

    if rest.is_empty() {
        // a purely positional record
        return Ok(Transaction {
            entry_date,
            ticker: ticker.to_string(),
            position: -1.0,
            amount: None,
            dividend: None,
            kind: Distribution::Final,
            payout_date: None,
            ex_date: None,
            tags: entry.tags.clone(),
            entry_attr: Some(attributes),
            origin: Default::default(),
        });
    }

    let components: Vec<&str> = rest.splitn(2, '@').collect();

    let mut dividend: Option<Amount> = None;
    let mut ex_date: Option<NaiveDate> = None;
    if components.len() > 1 {
        let (dividend_str, dividend_datestamp) = split_amount_date(components[1].trim());
        if !dividend_str.is_empty() {
            let amount = parse_amount(&dividend_str, separator, location)?;
            if amount.value <= 0.0 {
                return Err(parse_error(format!(
                    "negative or zero dividend ('{}')",
                    amount.value
                )));
            }
            dividend = Some(amount);
        }
        if let Some(datestamp) = dividend_datestamp {
            ex_date = Some(
                parse_datestamp(&datestamp, true)
                    .map_err(|_| parse_error(format!("invalid date format ('{datestamp}')")))?,
            );
        }
    }

    let mut amount: Option<Amount> = None;
    let mut payout_date: Option<NaiveDate> = None;
    {
        let (amount_str, amount_datestamp) = split_amount_date(components[0].trim());
        if !amount_str.is_empty() {
            let parsed = parse_amount(&amount_str, separator, location)?;
            if parsed.value < 0.0 {
                return Err(parse_error(format!("negative amount ('{}')", parsed.value)));
            }
            amount = Some(parsed);
        } else if dividend.is_none() {
            return Err(parse_error("missing dividend amount".to_string()));
        }
        if let Some(datestamp) = amount_datestamp {
            payout_date = Some(
                parse_datestamp(&datestamp, true)
                    .map_err(|_| parse_error(format!("invalid date format ('{datestamp}')")))?,
            );
        }
    }

    Ok(Transaction {
        entry_date,
        ticker: ticker.to_string(),
        position: -1.0,
        amount,
        dividend,
        kind,
        payout_date,
        ex_date,
        tags: entry.tags.clone(),
        entry_attr: Some(attributes),
        origin: Default::default(),
    })
}

/// Split a component into its amount text and an optional bracketed datestamp.
fn split_amount_date(text: &str) -> (String, Option<String>) {
    match BRACKETED.find(text) {
        Some(found) => {
            let datestamp = text[found.start() + 1..found.end() - 1].trim().to_string();
            let remainder = format!("{}{}", &text[..found.start()], &text[found.end()..]);
            (remainder.trim().to_string(), Some(datestamp))
        }
        None => (text.to_string(), None),
    }
}

/// Parse a cash amount with an optional symbol on either side of the number.
///
/// The side the symbol appears on determines the format template; symbols on
/// both sides are ambiguous, and a missing symbol is an error. A missing
/// number makes the amount a preliminary placeholder.
fn parse_amount(
    text: &str,
    separator: DecimalSeparator,
    location: &Location,
) -> Result<Amount> {
    let parse_error =
        |reason: String| LedgerError::parse(&location.path, location.line, reason);

    fn is_beginning(c: char) -> bool {
        c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | ',')
    }

    let chars: Vec<char> = text.chars().collect();

    // accumulate the right-hand side, in reverse, until the end of an amount
    let mut number_end = chars.len();
    while number_end > 0 && !is_beginning(chars[number_end - 1]) {
        number_end -= 1;
    }
    let rhs_raw: String = chars[number_end..].iter().collect();

    // accumulate the left-hand side until the beginning of an amount
    let mut number_start = 0;
    while number_start < number_end && !is_beginning(chars[number_start]) {
        number_start += 1;
    }
    let lhs_raw: String = chars[..number_start].iter().collect();

    let number: String = chars[number_start..number_end].iter().collect();

    // trailing whitespace is trimmed; a single space between number and
    // symbol is considered intentional and kept in the format
    let rhs = keep_one_leading_space(rhs_raw.trim_end());
    let lhs = keep_one_trailing_space(lhs_raw.trim_start());

    let mut symbol: Option<String> = None;
    if !rhs.is_empty() {
        symbol = Some(rhs.trim().to_string());
    }
    if !lhs.is_empty() {
        if let Some(symbol) = &symbol {
            return Err(parse_error(format!(
                "ambiguous symbol definition ('{}' or '{}'?)",
                symbol,
                lhs.trim()
            )));
        }
        symbol = Some(lhs.trim().to_string());
    }

    let symbol = match symbol {
        Some(symbol) if !symbol.is_empty() => symbol,
        _ => return Err(parse_error("missing symbol definition".to_string())),
    };

    let mut fmt = format!("{lhs}%s{rhs}");

    let value = if !number.is_empty() {
        parse_number(&number, separator)
            .ok_or_else(|| parse_error(format!("invalid value ('{number}')")))?
    } else {
        // no amount entered; no formatting can be determined beyond the symbol
        fmt = format!("%s {symbol}");
        0.0
    };

    Ok(Amount::literal(
        value,
        Some(decimal_places_str(&number, separator)),
        Some(symbol),
        Some(fmt),
    ))
}

fn keep_one_leading_space(text: &str) -> String {
    let stripped = text.trim_start();
    if stripped.len() < text.len() {
        format!(" {stripped}")
    } else {
        text.to_string()
    }
}

fn keep_one_trailing_space(text: &str) -> String {
    let stripped = text.trim_end();
    if stripped.len() < text.len() {
        format!("{stripped} ")
    } else {
        text.to_string()
    }
}

/// Normalize raw entries: compute each absolute post-entry position, complete
/// missing dividend components, flag preliminary records and enforce record
/// integrity. Input entries are brought into canonical order first.
fn normalize(mut entries: Vec<Transaction>) -> Result<Vec<Transaction>> {
    sort_canonically(&mut entries);

    let mut records: Vec<Transaction> = Vec::with_capacity(entries.len());

    for mut entry in entries {
        let Some(mut attr) = entry.entry_attr.take() else {
            // nothing to normalize for records without parse-time attributes
            records.push(entry);
            continue;
        };
        let location = attr.location.clone();
        let Positioning { value, directive } = attr.positioning;

        let mut position: Option<f64> = value;

        if position.is_none() || directive != Directive::Set {
            // infer the position from previously normalized entries, walking
            // the history in descending order of ex-date (or entry date)
            let mut history: Vec<&Transaction> = records.iter().collect();
            history.sort_by_key(|r| (r.ex_date.unwrap_or(r.entry_date), r.is_positional()));

            for previous in history.iter().rev() {
                if previous.ticker != entry.ticker {
                    continue;
                }
                if let Some(ex_date) = entry.ex_date {
                    if previous.entry_date > ex_date {
                        continue;
                    }
                }
                let change = value.unwrap_or(0.0);
                let computed = match directive {
                    Directive::Set => previous.position,
                    Directive::Add => truncate_floating_point(previous.position + change, 2),
                    Directive::Sub => truncate_floating_point(previous.position - change, 2),
                    Directive::Split => truncate_floating_point(previous.position * change, 2),
                    Directive::SplitWhole => {
                        truncate_floating_point(previous.position * change, 2).floor()
                    }
                };
                if computed < 0.0 {
                    return Err(LedgerError::inference(
                        Some(location.clone()),
                        format!("position change to negative position ({computed})"),
                    ));
                }
                position = Some(computed);
                break;
            }
        }

        if let (Some(amount), Some(dividend)) = (&entry.amount, &entry.dividend) {
            if amount.symbol == dividend.symbol {
                let inferred = amount.value / dividend.value;
                match position {
                    Some(explicit) => {
                        if !is_close(explicit, inferred, POSITION_TOLERANCE) {
                            return Err(LedgerError::inference(
                                Some(location.clone()),
                                format!("ambiguous position ({explicit} or {inferred}?)"),
                            ));
                        }
                    }
                    None => position = Some(truncate_floating_point(inferred, 2)),
                }
            }
        }

        let Some(position) = position else {
            return Err(LedgerError::inference(
                Some(location),
                "position could not be inferred",
            ));
        };

        if entry.amount.is_some() && position == 0.0 {
            return Err(LedgerError::integrity(
                Some(location.clone()),
                "payout on closed position",
            ));
        }

        if let Some(amount) = &entry.amount {
            if entry.dividend.is_none() {
                let inferred = truncate_floating_point(amount.value / position, 4);
                entry.dividend = Some(Amount::literal(
                    inferred,
                    Some(decimal_places(inferred)),
                    amount.symbol.clone(),
                    amount.fmt.clone(),
                ));
            }
        }

        if entry.amount.is_none() && entry.dividend.is_none() {
            if entry.payout_date.is_some() || entry.ex_date.is_some() {
                return Err(LedgerError::integrity(
                    Some(location),
                    "associated date on positional record",
                ));
            }
        }

        if let (Some(payout_date), Some(ex_date)) = (entry.payout_date, entry.ex_date) {
            if payout_date < ex_date {
                return Err(LedgerError::integrity(
                    Some(location),
                    "payout date dated earlier than ex-date",
                ));
            }
        }

        // a record with a dividend but no (or zero) amount is preliminary;
        // the placeholder keeps the currency the user expects an estimate in
        if entry.dividend.is_some()
            && entry.amount.as_ref().map_or(true, |amount| amount.value == 0.0)
        {
            attr.preliminary_amount = entry.amount.take();
            attr.is_preliminary = true;
        }

        entry.position = position;
        entry.entry_attr = Some(attr);
        records.push(entry);
    }

    Ok(records)
}

fn max_places<'a>(amounts: impl Iterator<Item = &'a Amount>) -> Option<usize> {
    amounts.filter_map(|amount| amount.places).max()
}

/// Serialize records back to journal text.
///
/// Positions and amounts are written with the maximum decimal-place count
/// observed per ticker; a blank line separates entries unless `condensed`,
/// in which case each entry occupies a single line.
pub fn write(
    records: &[Transaction],
    file: &mut dyn Write,
    condensed: bool,
    separator: DecimalSeparator,
) -> io::Result<()> {
    let mut position_places: HashMap<String, usize> = HashMap::new();
    let mut payout_places: HashMap<String, Option<usize>> = HashMap::new();
    let mut dividend_places: HashMap<String, Option<usize>> = HashMap::new();

    for ticker in tickers(records) {
        let matching: Vec<&Transaction> =
            records.iter().filter(|r| r.ticker == ticker).collect();
        payout_places.insert(
            ticker.clone(),
            max_places(matching.iter().filter_map(|r| r.amount.as_ref())),
        );
        dividend_places.insert(
            ticker.clone(),
            max_places(matching.iter().filter_map(|r| r.dividend.as_ref())),
        );
        position_places.insert(
            ticker.clone(),
            matching
                .iter()
                .map(|r| decimal_places(r.position))
                .max()
                .unwrap_or(0),
        );
    }

    for (n, record) in records.iter().enumerate() {
        let indicator = match record.kind {
            Distribution::Special => "* ",
            Distribution::Interim => "^ ",
            Distribution::Final => "",
        };
        let datestamp = record.entry_date.format("%Y/%m/%d");

        let places = position_places.get(&record.ticker).copied().unwrap_or(0);
        let position = format_amount(record.position, Some(places), false, separator);

        let mut line = format!("{datestamp} {indicator}{} ({position})", record.ticker);

        let mut amount_display = String::new();
        if let Some(payout_date) = record.payout_date {
            amount_display.push_str(&format!("[{}]", payout_date.format("%Y/%m/%d")));
        }
        if let Some(amount) = &record.amount {
            let places = payout_places.get(&record.ticker).copied().flatten();
            let display = formatted_value(amount, places, separator);
            if record.payout_date.is_some() {
                amount_display.push(' ');
            }
            amount_display.push_str(&display);
        }
        if let Some(dividend) = &record.dividend {
            let places = dividend_places.get(&record.ticker).copied().flatten();
            let display = formatted_value(dividend, places, separator);
            if record.payout_date.is_some() || record.amount.is_some() {
                amount_display.push_str(" @ ");
            } else {
                amount_display.push_str("@ ");
            }
            amount_display.push_str(&display);
        }
        if let Some(ex_date) = record.ex_date {
            let datestamp = ex_date.format("%Y/%m/%d");
            if record.dividend.is_some() {
                amount_display.push_str(&format!(" [{datestamp}]"));
            } else {
                amount_display.push_str(&format!(" @ [{datestamp}]"));
            }
        }
        if !record.tags.is_empty() {
            if !amount_display.is_empty() {
                amount_display.push(' ');
            }
            amount_display.push_str(&format!("; {}", record.tags.join(" ")));
        }

        if condensed {
            if !amount_display.is_empty() {
                line.push(' ');
                line.push_str(&amount_display);
            }
            writeln!(file, "{line}")?;
        } else {
            writeln!(file, "{line}")?;
            if !amount_display.is_empty() {
                writeln!(file, "  {amount_display}")?;
            }
            if n + 1 != records.len() {
                writeln!(file)?;
            }
        }
    }

    Ok(())
}

fn formatted_value(
    amount: &Amount,
    places: Option<usize>,
    separator: DecimalSeparator,
) -> String {
    let display = format_amount(amount.value, places, true, separator);
    match &amount.fmt {
        Some(fmt) => fmt.replace("%s", &display),
        None => display,
    }
}
