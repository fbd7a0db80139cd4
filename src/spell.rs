//! Spelled-out invoice totals.
//!
//! The integer part is grouped in powers of a thousand and the cents
//! become a trailing "and ... cents" clause. The result is upper-cased
//! because that is how it is painted under the grand total.

use crate::model::{Currency, Language};
use crate::money::to_cents;

const EN_ONES: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];
const EN_TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];
// u64 tops out in the quintillions.
const EN_SCALES: [&str; 7] = [
    "", "thousand", "million", "billion", "trillion", "quadrillion", "quintillion",
];

const PT_ONES: [&str; 20] = [
    "zero", "um", "dois", "três", "quatro", "cinco", "seis", "sete", "oito", "nove", "dez",
    "onze", "doze", "treze", "catorze", "quinze", "dezesseis", "dezessete", "dezoito",
    "dezenove",
];
const PT_TENS: [&str; 10] = [
    "", "", "vinte", "trinta", "quarenta", "cinquenta", "sessenta", "setenta", "oitenta",
    "noventa",
];
// Singular and plural from the millions up, indexed by scale - 2.
const PT_SCALES: [(&str, &str); 5] = [
    ("milhão", "milhões"),
    ("bilhão", "bilhões"),
    ("trilhão", "trilhões"),
    ("quatrilhão", "quatrilhões"),
    ("quintilhão", "quintilhões"),
];
const PT_HUNDREDS: [&str; 10] = [
    "", "cento", "duzentos", "trezentos", "quatrocentos", "quinhentos", "seiscentos",
    "setecentos", "oitocentos", "novecentos",
];

fn en_below_thousand(n: u64) -> String {
    let mut parts: Vec<String> = Vec::new();
    let hundreds = n / 100;
    let rest = n % 100;
    if hundreds > 0 {
        parts.push(format!("{} hundred", EN_ONES[hundreds as usize]));
    }
    if rest > 0 {
        if rest < 20 {
            parts.push(EN_ONES[rest as usize].to_string());
        } else if rest % 10 == 0 {
            parts.push(EN_TENS[(rest / 10) as usize].to_string());
        } else {
            parts.push(format!(
                "{}-{}",
                EN_TENS[(rest / 10) as usize],
                EN_ONES[(rest % 10) as usize]
            ));
        }
    }
    parts.join(" ")
}

fn en_integer(n: u64) -> String {
    if n == 0 {
        return EN_ONES[0].to_string();
    }
    let mut groups = Vec::new();
    let mut rest = n;
    while rest > 0 {
        groups.push(rest % 1000);
        rest /= 1000;
    }
    let mut parts = Vec::new();
    for (scale, group) in groups.iter().enumerate().rev() {
        if *group == 0 {
            continue;
        }
        let words = en_below_thousand(*group);
        match EN_SCALES[scale] {
            "" => parts.push(words),
            s => parts.push(format!("{words} {s}")),
        }
    }
    parts.join(" ")
}

fn pt_below_thousand(n: u64) -> String {
    if n == 100 {
        return "cem".to_string();
    }
    let mut parts: Vec<String> = Vec::new();
    let hundreds = n / 100;
    let rest = n % 100;
    if hundreds > 0 {
        parts.push(PT_HUNDREDS[hundreds as usize].to_string());
    }
    if rest > 0 {
        if rest < 20 {
            parts.push(PT_ONES[rest as usize].to_string());
        } else {
            parts.push(PT_TENS[(rest / 10) as usize].to_string());
            if rest % 10 > 0 {
                parts.push(PT_ONES[(rest % 10) as usize].to_string());
            }
        }
    }
    parts.join(" e ")
}

fn pt_group(group: u64, scale: usize) -> String {
    match scale {
        0 => pt_below_thousand(group),
        1 if group == 1 => "mil".to_string(),
        1 => format!("{} mil", pt_below_thousand(group)),
        _ => {
            let (singular, plural) = PT_SCALES[scale - 2];
            if group == 1 {
                format!("um {singular}")
            } else {
                format!("{} {plural}", pt_below_thousand(group))
            }
        }
    }
}

fn pt_integer(n: u64) -> String {
    if n == 0 {
        return PT_ONES[0].to_string();
    }
    let mut groups = Vec::new();
    let mut rest = n;
    while rest > 0 {
        groups.push(rest % 1000);
        rest /= 1000;
    }
    let present: Vec<(usize, u64)> = groups
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, g)| **g > 0)
        .map(|(s, g)| (s, *g))
        .collect();

    let mut out = String::new();
    for (idx, (scale, group)) in present.iter().enumerate() {
        if idx > 0 {
            // "mil e duzentos", "mil e trinta", but "mil duzentos e trinta".
            let is_last = idx + 1 == present.len();
            let joins_with_e = is_last && (*group < 100 || group % 100 == 0);
            out.push_str(if joins_with_e { " e " } else { " " });
        }
        out.push_str(&pt_group(*group, *scale));
    }
    out
}

fn currency_names(code: &str, lang: Language) -> (String, String) {
    let (singular, plural) = match (code, lang) {
        ("USD", Language::En) => ("US dollar", "US dollars"),
        ("USD", Language::Pt) => ("dólar americano", "dólares americanos"),
        ("EUR", _) => ("euro", "euros"),
        ("BRL", Language::En) => ("Brazilian real", "Brazilian reais"),
        ("BRL", Language::Pt) => ("real", "reais"),
        ("GBP", Language::En) => ("pound sterling", "pounds sterling"),
        ("GBP", Language::Pt) => ("libra esterlina", "libras esterlinas"),
        _ => (code, code),
    };
    (singular.to_string(), plural.to_string())
}

/// Spelled-out amount in the given language, upper-cased.
pub fn amount_in_words(amount: f64, currency: &Currency, lang: Language) -> String {
    let total_cents = to_cents(amount).unsigned_abs();
    let integer = total_cents / 100;
    let cents = total_cents % 100;
    let (singular, plural) = currency_names(&currency.code, lang);
    let unit = if integer == 1 { singular } else { plural };

    let words = match lang {
        Language::En => {
            let cent_word = if cents == 1 { "cent" } else { "cents" };
            match (integer, cents) {
                (0, c) if c > 0 => format!("{} {cent_word}", en_integer(c)),
                (i, 0) => format!("{} {unit}", en_integer(i)),
                (i, c) => format!("{} {unit} and {} {cent_word}", en_integer(i), en_integer(c)),
            }
        }
        Language::Pt => {
            let cent_word = if cents == 1 { "centavo" } else { "centavos" };
            // "um milhão de reais"
            let de = if integer >= 1_000_000 && integer % 1_000_000 == 0 { " de" } else { "" };
            match (integer, cents) {
                (0, c) if c > 0 => format!("{} {cent_word}", pt_integer(c)),
                (i, 0) => format!("{}{de} {unit}", pt_integer(i)),
                (i, c) => format!("{}{de} {unit} e {} {cent_word}", pt_integer(i), pt_integer(c)),
            }
        }
    };
    words.to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd() -> Currency {
        Currency::from_code("USD")
    }

    #[test]
    fn english_thousands_and_cents() {
        assert_eq!(
            amount_in_words(1200.0, &usd(), Language::En),
            "ONE THOUSAND TWO HUNDRED US DOLLARS"
        );
        assert_eq!(
            amount_in_words(2_015_021.5, &usd(), Language::En),
            "TWO MILLION FIFTEEN THOUSAND TWENTY-ONE US DOLLARS AND FIFTY CENTS"
        );
        assert_eq!(amount_in_words(1.01, &usd(), Language::En), "ONE US DOLLAR AND ONE CENT");
        assert_eq!(amount_in_words(0.0, &usd(), Language::En), "ZERO US DOLLARS");
        assert_eq!(amount_in_words(0.75, &usd(), Language::En), "SEVENTY-FIVE CENTS");
    }

    #[test]
    fn portuguese_joins() {
        let brl = Currency::from_code("BRL");
        assert_eq!(amount_in_words(1200.0, &brl, Language::Pt), "MIL E DUZENTOS REAIS");
        assert_eq!(amount_in_words(1230.0, &brl, Language::Pt), "MIL DUZENTOS E TRINTA REAIS");
        assert_eq!(amount_in_words(100.0, &brl, Language::Pt), "CEM REAIS");
        assert_eq!(amount_in_words(101.0, &brl, Language::Pt), "CENTO E UM REAIS");
        assert_eq!(amount_in_words(1.0, &brl, Language::Pt), "UM REAL");
        assert_eq!(amount_in_words(2_000_000.0, &brl, Language::Pt), "DOIS MILHÕES DE REAIS");
        assert_eq!(
            amount_in_words(21.35, &brl, Language::Pt),
            "VINTE E UM REAIS E TRINTA E CINCO CENTAVOS"
        );
    }

    #[test]
    fn large_amounts_use_their_own_scale() {
        assert_eq!(amount_in_words(2e12, &usd(), Language::En), "TWO TRILLION US DOLLARS");
        assert_eq!(
            amount_in_words(1_000_000_000_001.0, &usd(), Language::En),
            "ONE TRILLION ONE US DOLLARS"
        );
        let brl = Currency::from_code("BRL");
        assert_eq!(amount_in_words(2e12, &brl, Language::Pt), "DOIS TRILHÕES DE REAIS");
        assert_eq!(amount_in_words(1e9, &brl, Language::Pt), "UM BILHÃO DE REAIS");
    }

    #[test]
    fn words_agree_with_the_painted_figure() {
        for amount in [1.125, 0.125, 2.675, 1000.005, 19.995] {
            let figure = crate::money::format_money(amount, Language::En);
            let (_, cents) = figure.split_once('.').unwrap();
            let cents: u64 = cents.parse().unwrap();
            let words = amount_in_words(amount, &usd(), Language::En);
            if cents == 0 {
                assert!(!words.contains("CENT"), "{amount}: {figure} vs {words}");
            } else {
                let spelled = format!("{} CENT", en_integer(cents).to_uppercase());
                assert!(words.contains(&spelled), "{amount}: {figure} vs {words}");
            }
        }
        assert_eq!(amount_in_words(1.125, &usd(), Language::En), "ONE US DOLLAR AND THIRTEEN CENTS");
    }

    #[test]
    fn unknown_currency_uses_code() {
        let xyz = Currency::from_code("XYZ");
        assert_eq!(amount_in_words(3.0, &xyz, Language::En), "THREE XYZ");
    }
}
