//! Prompt text sent to the text-generation API.

use crate::models::Opportunity;

pub const NEXT_ACTION_SYSTEM: &str =
    "You are a CRM assistant that suggests next best actions for sales leads.";

pub const GIFT_SYSTEM: &str = "Bạn là trợ lý bán hàng chuyên nghiệp, giúp đề xuất quà tặng phù hợp cho khách hàng.";

/// Share of the gift budget spent on the main gift; the rest goes to the secondary one.
pub const MAIN_GIFT_SHARE: f64 = 0.7;

const UNKNOWN: &str = "Unknown";

/// Rounds to a whole number and groups thousands with commas: `1234567.6 -> "1,234,568"`.
pub fn format_amount(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// User message asking for the next best action on a lead.
pub fn next_action_prompt(lead: &Opportunity) -> String {
    let last_activity = lead
        .activity_deadline
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "None".to_string());

    format!(
        "Based on this lead information, what should be the next best action?\n\
         Lead: {}\n\
         Customer: {}\n\
         Stage: {}\n\
         Probability: {}%\n\
         Expected Revenue: {}\n\
         Last Activity: {}\n",
        lead.name,
        lead.customer_name.as_deref().unwrap_or(UNKNOWN),
        lead.stage_name.as_deref().unwrap_or(UNKNOWN),
        lead.probability,
        lead.expected_revenue,
        last_activity,
    )
}

/// User message asking for gift ideas within `budget`.
pub fn gift_prompt(lead: &Opportunity, budget: f64) -> String {
    let segment = lead
        .segment
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());

    format!(
        "Thông tin khách hàng:\n\
         - Tên: {customer}\n\
         - Doanh thu dự kiến: {revenue} VND\n\
         - Giá trị quà tặng tối đa: {budget} VND\n\
         - Ngành nghề: {industry}\n\
         - Loại khách hàng: {segment}\n\
         \n\
         Hãy đề xuất 3 món quà phù hợp với khách hàng này, bao gồm:\n\
         1. Món quà chính (giá trị khoảng {main} VND)\n\
         2. Món quà phụ (giá trị khoảng {secondary} VND)\n\
         3. Lý do chọn quà\n\
         \n\
         Format đề xuất:\n\
         - Quà chính: [tên quà] - [giá trị] - [lý do]\n\
         - Quà phụ: [tên quà] - [giá trị] - [lý do]\n",
        customer = lead.customer_name.as_deref().unwrap_or(UNKNOWN),
        revenue = format_amount(lead.expected_revenue),
        budget = format_amount(budget),
        industry = lead.customer_industry.as_deref().unwrap_or(UNKNOWN),
        segment = segment,
        main = format_amount(budget * MAIN_GIFT_SHARE),
        secondary = format_amount(budget * (1.0 - MAIN_GIFT_SHARE)),
    )
}
