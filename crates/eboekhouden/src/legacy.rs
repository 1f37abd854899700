//! Client for the legacy XML protocol.
//!
//! The legacy service authenticates per request with a username and two
//! security codes, and always returns at most the [`LEGACY_RECORD_CAP`]
//! most recent mutations regardless of any requested range. Responses
//! are XML envelopes with Dutch element names; this module parses them
//! into the shared [`Mutation`] shape and flags truncation so callers
//! can warn instead of assuming completeness.

use std::time::Duration;

use quick_xml::Reader;
use quick_xml::events::Event;

use api_types::{
    DateRange, MoneyCents, Mutation, MutationLine, Page, ledger::LedgerAccount,
    relation::Relation,
};

use crate::error::{ClientError, ClientResult};

/// Hard server-side cap on returned mutations.
pub const LEGACY_RECORD_CAP: usize = 500;

#[derive(Clone, Debug)]
pub struct LegacyConfig {
    pub url: String,
    pub username: String,
    pub security_code_1: String,
    pub security_code_2: String,
    pub request_timeout: Duration,
}

impl LegacyConfig {
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        security_code_1: impl Into<String>,
        security_code_2: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            security_code_1: security_code_1.into(),
            security_code_2: security_code_2.into(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct LegacyClient {
    http: reqwest::Client,
    config: LegacyConfig,
}

impl LegacyClient {
    pub fn new(config: LegacyConfig) -> ClientResult<Self> {
        if config.username.trim().is_empty() {
            return Err(ClientError::Config(
                "legacy username is not set".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ClientError::Transport)?;
        Ok(Self { http, config })
    }

    fn envelope(&self, action: &str, body: &str) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="utf-8"?>"#,
                r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">"#,
                r#"<soap:Body><{action} xmlns="http://www.e-boekhouden.nl/soap">"#,
                "<Username>{username}</Username>",
                "<SecurityCode1>{code1}</SecurityCode1>",
                "<SecurityCode2>{code2}</SecurityCode2>",
                "{body}",
                "</{action}></soap:Body></soap:Envelope>"
            ),
            action = action,
            username = xml_escape(&self.config.username),
            code1 = xml_escape(&self.config.security_code_1),
            code2 = xml_escape(&self.config.security_code_2),
            body = body,
        )
    }

    async fn call(&self, action: &str, body: &str) -> ClientResult<String> {
        let response = self
            .http
            .post(&self.config.url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header(
                "SOAPAction",
                format!("http://www.e-boekhouden.nl/soap/{action}"),
            )
            .body(self.envelope(action, body))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Protocol {
                status: status.as_u16(),
                message: text.chars().take(500).collect(),
            });
        }
        if let Some(fault) = extract_fault(&text) {
            // Credential faults come back inside a 200 envelope.
            return Err(ClientError::Auth(fault));
        }
        Ok(text)
    }

    /// Fetches mutations. The service silently truncates to the most
    /// recent [`LEGACY_RECORD_CAP`] records; the returned page carries
    /// `truncated = true` when that happened.
    ///
    /// The `range` is forwarded but the cap applies regardless of it.
    pub async fn mutations(&self, range: Option<DateRange>) -> ClientResult<Page<Mutation>> {
        let mut filter = String::new();
        if let Some(range) = range {
            if let Some(from) = range.from {
                filter.push_str(&format!("<DatumVan>{from}</DatumVan>"));
            }
            if let Some(to) = range.to {
                filter.push_str(&format!("<DatumTm>{to}</DatumTm>"));
            }
        }

        let xml = self.call("GetMutaties", &filter).await?;
        let mutations = parse_mutaties(&xml)?;
        if mutations.len() >= LEGACY_RECORD_CAP {
            tracing::warn!(
                count = mutations.len(),
                "legacy protocol hit its record cap; result is truncated"
            );
            Ok(Page::truncated(mutations))
        } else {
            Ok(Page::new(mutations))
        }
    }
}

impl LegacyClient {
    /// Fetches the chart of accounts. The legacy service identifies
    /// ledgers by code only; numeric codes double as ids.
    pub async fn ledgers(&self) -> ClientResult<Vec<LedgerAccount>> {
        let xml = self.call("GetGrootboekrekeningen", "").await?;
        parse_grootboekrekeningen(&xml)
    }

    /// Fetches all counterparty relations.
    pub async fn relations(&self) -> ClientResult<Vec<Relation>> {
        let xml = self.call("GetRelaties", "").await?;
        parse_relaties(&xml)
    }
}

/// Parses `<Grootboekrekening>` elements out of a legacy response.
pub fn parse_grootboekrekeningen(xml: &str) -> ClientResult<Vec<LedgerAccount>> {
    let fields = collect_elements(xml, "Grootboekrekening")?;
    Ok(fields
        .into_iter()
        .filter_map(|map| {
            let code = map.get("Code")?.clone();
            Some(LedgerAccount {
                id: code.trim().parse::<i64>().unwrap_or(0),
                code,
                description: map.get("Omschrijving").cloned().unwrap_or_default(),
                category: map.get("Categorie").cloned(),
                group: map.get("Groep").cloned(),
            })
        })
        .collect())
}

/// Parses `<Relatie>` elements out of a legacy response.
pub fn parse_relaties(xml: &str) -> ClientResult<Vec<Relation>> {
    let fields = collect_elements(xml, "Relatie")?;
    Ok(fields
        .into_iter()
        .filter_map(|map| {
            let id = map.get("Code")?.clone();
            Some(Relation {
                id,
                name: map.get("Naam").cloned(),
                company_name: map.get("Bedrijf").cloned(),
                contact_name: map.get("Contactpersoon").cloned(),
                email: map.get("Email").cloned(),
                city: map.get("Plaats").cloned(),
            })
        })
        .collect())
}

/// Collects each `<{element}>` occurrence as a flat child-tag → text map.
fn collect_elements(
    xml: &str,
    element: &str,
) -> ClientResult<Vec<std::collections::HashMap<String, String>>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut out = Vec::new();
    let mut current: Option<std::collections::HashMap<String, String>> = None;
    let mut current_tag: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                if name == element {
                    current = Some(std::collections::HashMap::new());
                } else {
                    current_tag = Some(name);
                }
            }
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|err| ClientError::Xml(err.to_string()))?
                    .into_owned();
                if let (Some(map), Some(tag)) = (current.as_mut(), current_tag.as_deref()) {
                    map.insert(tag.to_string(), value);
                }
            }
            Event::End(end) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).to_string();
                if name == element {
                    if let Some(map) = current.take() {
                        out.push(map);
                    }
                } else {
                    current_tag = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out)
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Pulls a SOAP fault or legacy error description out of an envelope, if
/// one is present.
fn extract_fault(xml: &str) -> Option<String> {
    for tag in ["faultstring", "LastErrorDescription"] {
        let open = format!("<{tag}>");
        let close = format!("</{tag}>");
        if let (Some(start), Some(end)) = (xml.find(&open), xml.find(&close)) {
            let value = xml[start + open.len()..end].trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Maps the legacy Dutch mutation kind labels onto the numeric type
/// codes used everywhere else. Unknown labels map to `-1`, which the
/// engine records as a validation failure.
fn soort_to_type_code(soort: &str) -> i32 {
    match soort {
        "BeginBalans" => 0,
        "FactuurOntvangen" => 1,
        "FactuurVerstuurd" => 2,
        "FactuurbetalingOntvangen" => 3,
        "FactuurbetalingVerstuurd" => 4,
        "GeldOntvangen" => 5,
        "GeldUitgegeven" => 6,
        "Memoriaal" => 7,
        _ => -1,
    }
}

#[derive(Default)]
struct MutatieBuilder {
    nr: Option<i64>,
    soort: Option<String>,
    datum: Option<String>,
    rekening: Option<String>,
    omschrijving: Option<String>,
    relatie_code: Option<String>,
    factuurnummer: Option<String>,
    regels: Vec<MutationLine>,
}

#[derive(Default)]
struct RegelBuilder {
    debet: MoneyCents,
    credit: MoneyCents,
    tegenrekening: Option<String>,
    omschrijving: Option<String>,
}

impl MutatieBuilder {
    fn build(self) -> Option<Mutation> {
        let id = self.nr?;
        let type_code = self
            .soort
            .as_deref()
            .map_or(-1, soort_to_type_code);
        let date = self.datum.as_deref().and_then(parse_legacy_date);
        let amount = self.regels.iter().map(|r| r.amount).sum();

        Some(Mutation {
            id,
            type_code,
            date,
            amount,
            balance: None,
            description: self.omschrijving,
            invoice_number: self.factuurnummer.filter(|s| !s.is_empty()),
            relation_code: self.relatie_code.filter(|s| !s.is_empty()),
            ledger_id: None,
            ledger_code: self.rekening.filter(|s| !s.is_empty()),
            rows: self.regels,
        })
    }
}

fn parse_legacy_date(raw: &str) -> Option<chrono::NaiveDate> {
    let day = if raw.len() > 10 { &raw[..10] } else { raw };
    chrono::NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn parse_amount(raw: &str) -> ClientResult<MoneyCents> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(MoneyCents::ZERO);
    }
    trimmed
        .parse::<MoneyCents>()
        .map_err(|err| ClientError::Xml(format!("invalid amount {trimmed:?}: {err}")))
}

/// Parses `<Mutatie>` elements (with nested `<MutatieRegel>` rows) out of
/// a legacy response envelope.
pub fn parse_mutaties(xml: &str) -> ClientResult<Vec<Mutation>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut mutations = Vec::new();
    let mut mutatie: Option<MutatieBuilder> = None;
    let mut regel: Option<RegelBuilder> = None;
    let mut current_tag: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                match name.as_str() {
                    "Mutatie" => mutatie = Some(MutatieBuilder::default()),
                    "MutatieRegel" => regel = Some(RegelBuilder::default()),
                    _ => current_tag = Some(name),
                }
            }
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|err| ClientError::Xml(err.to_string()))?
                    .into_owned();
                let Some(tag) = current_tag.as_deref() else {
                    continue;
                };
                if let Some(regel) = regel.as_mut() {
                    match tag {
                        "BedragDebet" => regel.debet = parse_amount(&value)?,
                        "BedragCredit" => regel.credit = parse_amount(&value)?,
                        "TegenrekeningCode" => regel.tegenrekening = Some(value),
                        "Omschrijving" => regel.omschrijving = Some(value),
                        _ => {}
                    }
                } else if let Some(mutatie) = mutatie.as_mut() {
                    match tag {
                        "MutatieNr" => {
                            mutatie.nr = value.trim().parse::<i64>().ok();
                        }
                        "Soort" => mutatie.soort = Some(value),
                        "Datum" => mutatie.datum = Some(value),
                        "Rekening" => mutatie.rekening = Some(value),
                        "Omschrijving" => mutatie.omschrijving = Some(value),
                        "RelatieCode" => mutatie.relatie_code = Some(value),
                        "Factuurnummer" => mutatie.factuurnummer = Some(value),
                        _ => {}
                    }
                }
            }
            Event::End(end) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).to_string();
                match name.as_str() {
                    "MutatieRegel" => {
                        if let (Some(regel), Some(mutatie)) = (regel.take(), mutatie.as_mut()) {
                            mutatie.regels.push(MutationLine {
                                ledger_id: None,
                                ledger_code: regel.tegenrekening,
                                amount: regel.debet - regel.credit,
                                description: regel.omschrijving,
                            });
                        }
                    }
                    "Mutatie" => {
                        if let Some(built) = mutatie.take().and_then(MutatieBuilder::build) {
                            mutations.push(built);
                        }
                    }
                    _ => current_tag = None,
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(mutations)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <GetMutatiesResponse>
      <Mutaties>
        <Mutatie>
          <MutatieNr>2001</MutatieNr>
          <Soort>FactuurVerstuurd</Soort>
          <Datum>2023-03-01T00:00:00</Datum>
          <Rekening>1300</Rekening>
          <RelatieCode>40001</RelatieCode>
          <Factuurnummer>2023-007</Factuurnummer>
          <Omschrijving>Contributie maart</Omschrijving>
          <MutatieRegels>
            <MutatieRegel>
              <BedragDebet>0,00</BedragDebet>
              <BedragCredit>25,00</BedragCredit>
              <TegenrekeningCode>8000</TegenrekeningCode>
              <Omschrijving>Contributie</Omschrijving>
            </MutatieRegel>
          </MutatieRegels>
        </Mutatie>
        <Mutatie>
          <MutatieNr>2002</MutatieNr>
          <Soort>GeldOntvangen</Soort>
          <Datum>2023-03-02T00:00:00</Datum>
          <Rekening>1000</Rekening>
          <Omschrijving>Pinbetaling</Omschrijving>
          <MutatieRegels>
            <MutatieRegel>
              <BedragDebet>25,00</BedragDebet>
              <BedragCredit>0,00</BedragCredit>
              <TegenrekeningCode>1300</TegenrekeningCode>
            </MutatieRegel>
          </MutatieRegels>
        </Mutatie>
      </Mutaties>
    </GetMutatiesResponse>
  </soap:Body>
</soap:Envelope>"#;

    #[test]
    fn parses_mutatie_elements() {
        let mutations = parse_mutaties(SAMPLE).unwrap();
        assert_eq!(mutations.len(), 2);

        let first = &mutations[0];
        assert_eq!(first.id, 2001);
        assert_eq!(first.type_code, 2);
        assert_eq!(
            first.date,
            Some(chrono::NaiveDate::from_ymd_opt(2023, 3, 1).unwrap())
        );
        assert_eq!(first.ledger_code.as_deref(), Some("1300"));
        assert_eq!(first.relation_code.as_deref(), Some("40001"));
        assert_eq!(first.rows.len(), 1);
        assert_eq!(first.rows[0].amount.cents(), -2500);
        assert_eq!(first.rows[0].ledger_code.as_deref(), Some("8000"));

        let second = &mutations[1];
        assert_eq!(second.type_code, 5);
        assert_eq!(second.rows[0].amount.cents(), 2500);
    }

    #[test]
    fn unknown_soort_maps_to_invalid_code() {
        let xml = "<Mutatie><MutatieNr>9</MutatieNr><Soort>Onbekend</Soort></Mutatie>";
        let mutations = parse_mutaties(xml).unwrap();
        assert_eq!(mutations[0].type_code, -1);
    }

    #[test]
    fn malformed_xml_is_an_error_not_a_panic() {
        assert!(parse_mutaties("<Mutatie><MutatieNr>1</Broken>").is_err());
    }

    #[test]
    fn fault_is_extracted() {
        let xml = "<soap:Envelope><faultstring>Invalid credentials</faultstring></soap:Envelope>";
        assert_eq!(extract_fault(xml).as_deref(), Some("Invalid credentials"));
    }
}
