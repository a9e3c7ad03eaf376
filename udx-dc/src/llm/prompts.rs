// LLM Prompt Assembly
//
// Concept: All prompt text lives here. The gatekeeper templates are
// versioned and fingerprinted; the cache key includes the fingerprint, so
// any edit to a gatekeeper template automatically invalidates stale cache
// entries. Prompt assembly is deterministic: same inputs, same string.

use crate::llm::examples::ExampleCorpus;
use crate::spine::types::DocType;
use sha2::{Digest, Sha256};

/// Bumped when the gatekeeper prompt or its output schema changes
pub const GATEKEEPER_PROMPT_VERSION: &str = "gk-v3";

/// Named confusion pairs with a disambiguation hint each
///
/// Ordering is stable; these feed the escalation prompt verbatim.
pub const CONFUSION_PAIRS: &[(&str, &str, &str)] = &[
    (
        "BALANCE_SHEET",
        "PERSONAL_FINANCIAL_STATEMENT",
        "a balance sheet describes a business entity; a personal financial statement lists an individual's assets and liabilities",
    ),
    (
        "INCOME_STATEMENT",
        "RENT_ROLL",
        "a rent roll lists units and tenants line by line; an income statement aggregates revenue and expenses",
    ),
    (
        "INCOME_STATEMENT",
        "BANK_STATEMENT",
        "a bank statement is a dated transaction log with running balances; an income statement summarizes a period",
    ),
    (
        "SCHEDULE_K1",
        "IRS_PARTNERSHIP",
        "a Schedule K-1 names its parent return (Form 1065) but reports one partner's share, not the whole return",
    ),
    (
        "W2",
        "IRS_PERSONAL",
        "a W-2 references Form 1040 in its instructions; only the return itself is IRS_PERSONAL",
    ),
];

/// Escalation prompt over the first two pages
pub fn spine_escalation_prompt(corpus: &ExampleCorpus, first_two_pages: &str) -> String {
    let mut prompt = String::with_capacity(4096);

    prompt.push_str(
        "You classify loan-underwriting documents. Read the document text and \
         determine its type.\n\nAllowed document types:\n",
    );
    for doc_type in DocType::all() {
        prompt.push_str(&format!(
            "- {}: {}\n",
            doc_type.as_str(),
            type_definition(*doc_type)
        ));
    }

    prompt.push_str(
        "\nPROHIBITED: never output the legacy label \"T12\". A trailing-twelve-month \
         or any multi-period operating statement is INCOME_STATEMENT.\n",
    );

    prompt.push_str("\nCommonly confused pairs:\n");
    for (a, b, hint) in CONFUSION_PAIRS {
        prompt.push_str(&format!("- {} vs {}: {}\n", a, b, hint));
    }

    let examples = corpus.examples();
    if !examples.is_empty() {
        prompt.push_str("\nHistorical misclassifications to avoid repeating:\n");
        for ex in examples {
            prompt.push_str(&format!(
                "- Text like \"{}\" was wrongly called {}; correct type is {} ({})\n",
                ex.snippet, ex.wrong_type, ex.correct_type, ex.note
            ));
        }
    }

    prompt.push_str(
        "\nRespond with strict JSON only, no prose, matching exactly:\n\
         {\"doc_type\": \"<one allowed type>\", \"confidence\": <0.0-1.0>, \
         \"tax_year\": <year or null>, \"entity_type\": \
         \"INDIVIDUAL\"|\"PARTNERSHIP\"|\"CORPORATION\"|\"S_CORPORATION\"|null, \
         \"reason\": \"<one sentence>\"}\n\
         Set tax_year only when the document states it. Be honest about confidence.\n\
         \nDocument text (first two pages):\n---\n",
    );
    prompt.push_str(first_two_pages);
    prompt.push_str("\n---\n");

    prompt
}

/// One-line definition per fine-grained type, used in the taxonomy listing
fn type_definition(doc_type: DocType) -> &'static str {
    use DocType::*;
    match doc_type {
        IrsPersonal => "IRS Form 1040 / 1040-SR personal income tax return",
        IrsPartnership => "IRS Form 1065 partnership income tax return",
        IrsCorp => "IRS Form 1120 C corporation income tax return",
        IrsSCorp => "IRS Form 1120-S S corporation income tax return",
        ScheduleK1 => "Schedule K-1, one owner's share of a pass-through return",
        W2 => "Form W-2 wage and tax statement",
        Form1099 => "Form 1099 information return (any suffix)",
        IncomeStatement => "profit and loss / operating statement for any period",
        BalanceSheet => "business balance sheet with total assets and liabilities",
        RentRoll => "per-unit tenant and rent listing for a property",
        DebtSchedule => "schedule of business debts with creditors and balances",
        ArAging => "accounts receivable aging report",
        BankStatement => "bank account statement or transaction history",
        VoidedCheck => "voided check used for account verification",
        PersonalFinancialStatement => "individual's statement of assets, liabilities, net worth",
        Other => "none of the above",
    }
}

// ============================================================================
// Gatekeeper prompts
// ============================================================================

/// Gatekeeper text-path template; `{DOCUMENT_TEXT}` is replaced at call time
const GATEKEEPER_TEMPLATE: &str = "\
You are a triage classifier for loan-underwriting documents. Assign exactly one \
coarse category:\n\
- PERSONAL_TAX_RETURN: Form 1040 family personal return\n\
- BUSINESS_TAX_RETURN: Form 1065, 1120, or 1120-S business return\n\
- W2: Form W-2 wage and tax statement\n\
- FORM_1099: any Form 1099 variant\n\
- SCHEDULE_K1: Schedule K-1 of any parent return\n\
- FINANCIAL_STATEMENT: balance sheet, income statement, or other business financials\n\
- BANK_STATEMENT: bank account statement or transaction history\n\
- PERSONAL_FINANCIAL_STATEMENT: individual's assets/liabilities/net-worth statement\n\
- RENT_ROLL: per-unit tenant and rent listing\n\
- OTHER: recognizable document outside these categories\n\
- UNKNOWN: cannot tell\n\
\n\
Respond with strict JSON only:\n\
{\"doc_type\": \"<category>\", \"confidence\": <0.0-1.0>, \"tax_year\": <year or null>, \
\"reasons\": [\"<short reason>\"], \"form_numbers\": [\"<form number>\"], \
\"has_ein\": <bool>, \"has_ssn\": <bool>}\n\
Use UNKNOWN with low confidence when unsure. Set tax_year only when stated.\n\
\n\
Document text:\n---\n{DOCUMENT_TEXT}\n---\n";

/// Gatekeeper vision-path instructions (image attached separately)
const GATEKEEPER_VISION_TEMPLATE: &str = "\
You are a triage classifier for loan-underwriting documents. The document is \
attached as an image; read it and assign exactly one coarse category from: \
PERSONAL_TAX_RETURN, BUSINESS_TAX_RETURN, W2, FORM_1099, SCHEDULE_K1, \
FINANCIAL_STATEMENT, BANK_STATEMENT, PERSONAL_FINANCIAL_STATEMENT, RENT_ROLL, \
OTHER, UNKNOWN.\n\
\n\
Respond with strict JSON only:\n\
{\"doc_type\": \"<category>\", \"confidence\": <0.0-1.0>, \"tax_year\": <year or null>, \
\"reasons\": [\"<short reason>\"], \"form_numbers\": [\"<form number>\"], \
\"has_ein\": <bool>, \"has_ssn\": <bool>}\n\
Use UNKNOWN with low confidence when unsure. Set tax_year only when stated.\n";

/// Assemble the gatekeeper text prompt for one document
pub fn gatekeeper_prompt(document_text: &str) -> String {
    GATEKEEPER_TEMPLATE.replace("{DOCUMENT_TEXT}", document_text)
}

/// The gatekeeper vision prompt (static)
pub fn gatekeeper_vision_prompt() -> &'static str {
    GATEKEEPER_VISION_TEMPLATE
}

/// Fingerprint of the gatekeeper prompt version + templates
///
/// Stable across documents; changes exactly when the prompt or schema does.
/// Part of the cache key, so stale cached classifications never resurface
/// after a prompt edit.
pub fn gatekeeper_prompt_fingerprint() -> String {
    let mut hasher = Sha256::new();
    hasher.update(GATEKEEPER_PROMPT_VERSION.as_bytes());
    hasher.update(b"\n");
    hasher.update(GATEKEEPER_TEMPLATE.as_bytes());
    hasher.update(b"\n");
    hasher.update(GATEKEEPER_VISION_TEMPLATE.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of raw content bytes, hex-encoded; the other half of the cache key
pub fn content_fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
