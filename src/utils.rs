// Raffle View - Utility Functions
use crate::error::RaffleClientError;
use crate::raffle_state::Address;

/// Largest power of ten that fits in a u128
const MAX_DECIMALS: u8 = 38;

fn pow10(decimals: u8) -> Result<u128, RaffleClientError> {
    if decimals > MAX_DECIMALS {
        return Err(RaffleClientError::InvalidInput(format!(
            "{} decimals is more than supported",
            decimals
        )));
    }
    Ok(10u128.pow(decimals as u32))
}

/// Render a base-unit amount as a decimal string, e.g. 12_500_000 with 6 decimals -> "12.5"
pub fn format_units(value: u128, decimals: u8) -> String {
    let scale = match pow10(decimals) {
        Ok(scale) => scale,
        Err(_) => return value.to_string(),
    };
    let whole = value / scale;
    let fraction = value % scale;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", fraction, width = decimals as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Parse user input such as "12.5" into base units
pub fn parse_units(text: &str, decimals: u8) -> Result<u128, RaffleClientError> {
    let scale = pow10(decimals)?;
    let text = text.trim();
    let invalid = || RaffleClientError::InvalidInput(format!("{:?} is not a valid amount", text));

    let (whole, fraction) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if fraction.len() > decimals as usize {
        return Err(RaffleClientError::InvalidInput(format!(
            "at most {} decimal places allowed",
            decimals
        )));
    }

    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<u128>().map_err(|_| invalid())?
    };
    let fraction_units = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", fraction, width = decimals as usize);
        padded.parse::<u128>().map_err(|_| invalid())?
    };

    whole_units
        .checked_mul(scale)
        .and_then(|v| v.checked_add(fraction_units))
        .ok_or_else(invalid)
}

/// Total price of `count` tickets
pub fn ticket_cost(ticket_price: u128, count: u64) -> Result<u128, RaffleClientError> {
    ticket_price
        .checked_mul(count as u128)
        .ok_or_else(|| RaffleClientError::InvalidInput("ticket cost overflows".to_string()))
}

/// Fee taken from `amount` at `percent` (whole percent)
pub fn calculate_fee(amount: u128, percent: u128) -> u128 {
    amount.saturating_mul(percent) / 100
}

/// "0x1234...abcd"
pub fn short_address(address: &Address) -> String {
    let full = address.to_string();
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// Human countdown for the time left until a deadline
pub fn format_countdown(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Seconds until `deadline`, zero once it has passed
pub fn seconds_left(deadline: u64, now: u64) -> u64 {
    deadline.saturating_sub(now)
}

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
