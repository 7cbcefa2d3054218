//! Guided credit simulation: four questions, one annuity estimate.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::engine::contact::{SimStep, SimulatorState};
use crate::engine::texts;

const MIN_AGE: u32 = 18;
const MAX_AGE: u32 = 75;
const MIN_PROPERTY_VALUE: Decimal = dec!(10_000);
const MAX_PROPERTY_VALUE: Decimal = dec!(5_000_000);
const MIN_TERM_YEARS: u32 = 5;
const MAX_TERM_YEARS: u32 = 40;

/// Result of a completed simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub financed: Decimal,
    pub monthly_payment: Decimal,
    pub months: u32,
}

impl Estimate {
    pub fn years(&self) -> u32 {
        self.months / 12
    }
}

/// Outcome of feeding one answer into the simulator.
#[derive(Debug, Clone, PartialEq)]
pub enum SimAdvance {
    /// The answer did not parse or is out of range; ask again.
    Reprompt(&'static str),
    /// Store the updated state and ask the next question.
    Next(SimulatorState, &'static str),
    /// All answers collected.
    Done(Estimate),
}

/// Feed one contact answer into the simulator.
pub fn advance(state: &SimulatorState, text: &str, annual_rate: Decimal) -> SimAdvance {
    match state.step {
        SimStep::Age => match parse_age(text) {
            Some(age) if (MIN_AGE..=MAX_AGE).contains(&age) => SimAdvance::Next(
                SimulatorState {
                    step: SimStep::PropertyValue,
                    age: Some(age),
                    ..state.clone()
                },
                texts::SIM_ASK_PROPERTY_VALUE,
            ),
            _ => SimAdvance::Reprompt(texts::SIM_INVALID_AGE),
        },
        SimStep::PropertyValue => match parse_number(text) {
            Some(value) if (MIN_PROPERTY_VALUE..=MAX_PROPERTY_VALUE).contains(&value) => {
                SimAdvance::Next(
                    SimulatorState {
                        step: SimStep::TermYears,
                        property_value: Some(value),
                        ..state.clone()
                    },
                    texts::SIM_ASK_TERM,
                )
            }
            _ => SimAdvance::Reprompt(texts::SIM_INVALID_PROPERTY_VALUE),
        },
        SimStep::TermYears => {
            let years = parse_number(text)
                .filter(|d| d.fract().is_zero())
                .and_then(|d| d.to_u32());
            match years {
                Some(years) if (MIN_TERM_YEARS..=MAX_TERM_YEARS).contains(&years) => {
                    SimAdvance::Next(
                        SimulatorState {
                            step: SimStep::DownPayment,
                            term_years: Some(years),
                            ..state.clone()
                        },
                        texts::SIM_ASK_DOWN_PAYMENT,
                    )
                }
                _ => SimAdvance::Reprompt(texts::SIM_INVALID_TERM),
            }
        }
        SimStep::DownPayment => {
            let (Some(value), Some(years)) = (state.property_value, state.term_years) else {
                return SimAdvance::Reprompt(texts::SIM_INVALID_DOWN_PAYMENT);
            };
            match parse_number(text) {
                Some(down) if down < value => match estimate(value, down, years, annual_rate) {
                    Some(est) => SimAdvance::Done(est),
                    None => SimAdvance::Reprompt(texts::SIM_INVALID_DOWN_PAYMENT),
                },
                _ => SimAdvance::Reprompt(texts::SIM_INVALID_DOWN_PAYMENT),
            }
        }
    }
}

/// Parse a money amount the way contacts actually type them:
/// "250.000", "250 000", "1.500,50", "€300000", "3.5".
pub fn parse_number(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '€')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = if cleaned.contains(',') {
        // European style: dots group thousands, the comma marks decimals.
        cleaned.replace('.', "").replace(',', ".")
    } else if cleaned.contains('.') {
        // Dots are thousands separators only when every group after the
        // first has exactly three digits; otherwise the dot is a decimal
        // point ("3.5").
        let all_thousands = {
            let groups: Vec<&str> = cleaned.split('.').collect();
            groups.len() > 1 && groups[1..].iter().all(|g| g.len() == 3)
        };
        if all_thousands {
            cleaned.replace('.', "")
        } else {
            cleaned
        }
    } else {
        cleaned
    };

    let value: Decimal = normalized.parse().ok()?;
    if value.is_sign_negative() {
        return None;
    }
    Some(value)
}

/// Pull an age out of free text ("35", "tenho 35 anos").
pub fn parse_age(text: &str) -> Option<u32> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || digits.len() > 3 {
        return None;
    }
    digits.parse().ok()
}

/// Standard annuity payment for the financed amount.
///
/// `None` when the inputs make no loan: nothing financed, zero months, or
/// a degenerate rate.
pub fn estimate(
    value: Decimal,
    down: Decimal,
    years: u32,
    annual_rate_pct: Decimal,
) -> Option<Estimate> {
    let financed = value - down;
    if financed <= Decimal::ZERO {
        return None;
    }
    let months = years.checked_mul(12)?;
    if months == 0 {
        return None;
    }

    let monthly_rate = annual_rate_pct / dec!(100) / dec!(12);
    let monthly_payment = if monthly_rate.is_zero() {
        financed / Decimal::from(months)
    } else {
        // Annuity formula, with the power term expanded iteratively to
        // stay inside Decimal.
        let base = Decimal::ONE + monthly_rate;
        let mut factor = Decimal::ONE;
        for _ in 0..months {
            factor = factor.checked_mul(base)?;
        }
        let denominator = Decimal::ONE - (Decimal::ONE / factor);
        if denominator.is_zero() {
            return None;
        }
        financed * monthly_rate / denominator
    };

    Some(Estimate {
        financed: financed.round_dp(2),
        monthly_payment: monthly_payment.round_dp(2),
        months,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_portuguese_amounts() {
        assert_eq!(parse_number("250.000"), Some(dec!(250_000)));
        assert_eq!(parse_number("1.234.567"), Some(dec!(1_234_567)));
        assert_eq!(parse_number("1.500,50"), Some(dec!(1500.50)));
        assert_eq!(parse_number("€ 300 000"), Some(dec!(300_000)));
        assert_eq!(parse_number("250000"), Some(dec!(250_000)));
        assert_eq!(parse_number("3.5"), Some(dec!(3.5)));
        assert_eq!(parse_number("12.34"), Some(dec!(12.34)));
    }

    #[test]
    fn rejects_non_amounts() {
        assert_eq!(parse_number("não sei"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("-500"), None);
    }

    #[test]
    fn parses_age_from_free_text() {
        assert_eq!(parse_age("35"), Some(35));
        assert_eq!(parse_age("tenho 35 anos"), Some(35));
        assert_eq!(parse_age("trinta e cinco"), None);
        assert_eq!(parse_age("123456"), None);
    }

    #[test]
    fn zero_rate_divides_evenly() {
        let est = estimate(dec!(120_000), dec!(20_000), 10, Decimal::ZERO).unwrap();
        assert_eq!(est.financed, dec!(100_000));
        assert_eq!(est.months, 120);
        assert_eq!(est.monthly_payment, dec!(833.33));
    }

    #[test]
    fn annuity_matches_reference_value() {
        // 100k over 30 years at 3% nominal annual.
        let est = estimate(dec!(150_000), dec!(50_000), 30, dec!(3)).unwrap();
        assert_eq!(est.financed, dec!(100_000));
        assert_eq!(est.monthly_payment, dec!(421.60));
        assert_eq!(est.years(), 30);
    }

    #[test]
    fn down_payment_must_leave_something_financed() {
        assert_eq!(estimate(dec!(100_000), dec!(100_000), 30, dec!(3)), None);
        assert_eq!(estimate(dec!(100_000), dec!(120_000), 30, dec!(3)), None);
    }

    #[test]
    fn advance_walks_all_four_steps() {
        let rate = dec!(3);
        let state = SimulatorState::start();

        let SimAdvance::Next(state, prompt) = advance(&state, "35", rate) else {
            panic!("age should advance");
        };
        assert_eq!(prompt, texts::SIM_ASK_PROPERTY_VALUE);
        assert_eq!(state.age, Some(35));

        let SimAdvance::Next(state, prompt) = advance(&state, "250.000", rate) else {
            panic!("property value should advance");
        };
        assert_eq!(prompt, texts::SIM_ASK_TERM);
        assert_eq!(state.property_value, Some(dec!(250_000)));

        let SimAdvance::Next(state, prompt) = advance(&state, "30", rate) else {
            panic!("term should advance");
        };
        assert_eq!(prompt, texts::SIM_ASK_DOWN_PAYMENT);
        assert_eq!(state.term_years, Some(30));

        let SimAdvance::Done(est) = advance(&state, "50.000", rate) else {
            panic!("down payment should finish");
        };
        assert_eq!(est.financed, dec!(200_000));
        assert_eq!(est.monthly_payment, dec!(843.21));
    }

    #[test]
    fn out_of_range_answers_reprompt() {
        let rate = dec!(3);
        let state = SimulatorState::start();
        assert_eq!(
            advance(&state, "12", rate),
            SimAdvance::Reprompt(texts::SIM_INVALID_AGE)
        );
        assert_eq!(
            advance(&state, "epá não sei", rate),
            SimAdvance::Reprompt(texts::SIM_INVALID_AGE)
        );

        let state = SimulatorState {
            step: SimStep::TermYears,
            age: Some(35),
            property_value: Some(dec!(250_000)),
            term_years: None,
            down_payment: None,
        };
        assert_eq!(
            advance(&state, "50", rate),
            SimAdvance::Reprompt(texts::SIM_INVALID_TERM)
        );
        assert_eq!(
            advance(&state, "12.5", rate),
            SimAdvance::Reprompt(texts::SIM_INVALID_TERM)
        );
    }

    #[test]
    fn down_payment_equal_to_value_reprompts() {
        let state = SimulatorState {
            step: SimStep::DownPayment,
            age: Some(35),
            property_value: Some(dec!(250_000)),
            term_years: Some(30),
            down_payment: None,
        };
        assert_eq!(
            advance(&state, "250.000", dec!(3)),
            SimAdvance::Reprompt(texts::SIM_INVALID_DOWN_PAYMENT)
        );
    }
}
