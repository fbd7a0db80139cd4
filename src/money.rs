use crate::model::{Currency, Language};

/// Groups the integer part of an already fixed-point string.
fn group_thousands(int_part: &str, sep: char) -> String {
    let chars: Vec<char> = int_part.chars().collect();
    let mut out = String::new();
    let mut cnt = 0;
    for i in (0..chars.len()).rev() {
        if cnt == 3 {
            out.push(sep);
            cnt = 0;
        }
        out.push(chars[i]);
        cnt += 1;
    }
    out.chars().rev().collect()
}

fn format_fixed(v: f64, thousands: char, decimal: char) -> String {
    let cents = to_cents(v);
    let abs = cents.unsigned_abs();
    let sign = if cents < 0 { "-" } else { "" };
    format!(
        "{}{}{}{:02}",
        sign,
        group_thousands(&(abs / 100).to_string(), thousands),
        decimal,
        abs % 100
    )
}

/// `1,234.50` in English, `1.234,50` in Portuguese.
pub fn format_money(v: f64, lang: Language) -> String {
    match lang {
        Language::En => format_fixed(v, ',', '.'),
        Language::Pt => format_fixed(v, '.', ','),
    }
}

/// Currency code and symbol ahead of the amount, e.g. `USD $ 1,200.00`.
pub fn format_currency(v: f64, currency: &Currency, lang: Language) -> String {
    let amount = format_money(v, lang);
    if currency.symbol.is_empty() {
        format!("{} {}", currency.code, amount)
    } else {
        format!("{} {} {}", currency.code, currency.symbol, amount)
    }
}

/// Whole quantities print without decimals; fractional ones keep two.
pub fn format_qty(v: f64, lang: Language) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        return format!("{}", v as i64);
    }
    let s = format!("{:.2}", v);
    match lang {
        Language::En => s,
        Language::Pt => s.replace('.', ","),
    }
}

/// Whole cents, half away from zero. Figures and spelled-out amounts both
/// derive from this value so they cannot disagree.
pub fn to_cents(v: f64) -> i64 {
    (v * 100.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locales_swap_separator_roles() {
        assert_eq!(format_money(1234567.891, Language::En), "1,234,567.89");
        assert_eq!(format_money(1234567.891, Language::Pt), "1.234.567,89");
        assert_eq!(format_money(0.5, Language::En), "0.50");
        assert_eq!(format_money(999.0, Language::Pt), "999,00");
    }

    #[test]
    fn negative_amounts_keep_grouping() {
        assert_eq!(format_money(-1250.0, Language::En), "-1,250.00");
        assert_eq!(format_money(-100.0, Language::En), "-100.00");
        assert_eq!(format_money(-0.001, Language::En), "0.00");
    }

    #[test]
    fn half_cents_round_away_from_zero() {
        assert_eq!(format_money(1.125, Language::En), "1.13");
        assert_eq!(format_money(0.125, Language::Pt), "0,13");
        assert_eq!(format_money(-1.125, Language::En), "-1.13");
        assert_eq!(to_cents(2.675), 267);
        assert_eq!(format_money(2.675, Language::En), "2.67");
    }

    #[test]
    fn currency_prefix_has_code_and_symbol() {
        let usd = Currency::from_code("usd");
        assert_eq!(format_currency(1200.0, &usd, Language::En), "USD $ 1,200.00");
        let brl = Currency::from_code("BRL");
        assert_eq!(format_currency(1200.0, &brl, Language::Pt), "BRL R$ 1.200,00");
        let xyz = Currency::from_code("XYZ");
        assert_eq!(format_currency(3.0, &xyz, Language::En), "XYZ 3.00");
    }

    #[test]
    fn quantities() {
        assert_eq!(format_qty(3.0, Language::En), "3");
        assert_eq!(format_qty(2.5, Language::Pt), "2,50");
        assert_eq!(format_qty(0.0, Language::En), "0");
    }
}
