//! Common regex patterns for Spanish notarial documents.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Identifier layouts, applied to normalized (separator-free, upper-case) input
    pub static ref NIF_FORMAT: Regex = Regex::new(r"^\d{8}[A-Z]$").unwrap();

    pub static ref NIE_FORMAT: Regex = Regex::new(r"^[XYZ]\d{7}[A-Z]$").unwrap();

    pub static ref CIF_FORMAT: Regex = Regex::new(r"^[ABCDEFGHJNPQRSUVW]\d{7}[0-9A-Z]$").unwrap();

    // Identifiers embedded in free text
    pub static ref ID_IN_TEXT: Regex = Regex::new(
        r"(?i)\b(\d{8}[\s\-.]?[A-Z]|[XYZ][\s\-.]?\d{7}[\s\-.]?[A-Z]|[ABCDEFGHJNPQRSUVW][\s\-.]?\d{7}[\s\-.]?[0-9A-J])\b"
    ).unwrap();

    // Cadastral reference: 14 or 20 alphanumerics, optionally grouped by spaces
    pub static ref CADASTRAL_IN_TEXT: Regex = Regex::new(
        r"(?i)referencia\s+catastral[^:\n]*[\s:]*([0-9A-Z]{7}\s?[0-9A-Z]{7}(?:\s?[0-9A-Z]{4}\s?[0-9A-Z]{2})?)\b"
    ).unwrap();

    // Dates
    pub static ref DATE_ISO: Regex = Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").unwrap();

    pub static ref DATE_DMY: Regex = Regex::new(
        r"^(\d{1,2})[./\-](\d{1,2})[./\-](\d{4}|\d{2})$"
    ).unwrap();

    pub static ref DATE_SPANISH_LONG: Regex = Regex::new(
        r"^(\d{1,2})(?:º|o)?\s+de\s+([a-z]+)\s+(?:de|del)\s+(\d{4})$"
    ).unwrap();

    pub static ref DATE_IN_TEXT: Regex = Regex::new(
        r"(?i)\b(\d{1,2}[./\-]\d{1,2}[./\-]\d{4}|\d{4}-\d{2}-\d{2}|\d{1,2}\s+de\s+[a-záéíóú]+\s+(?:de|del)\s+\d{4})\b"
    ).unwrap();

    // Amounts (150.000,50 / 150,000.50 / 150000.50) with optional currency
    pub static ref AMOUNT_IN_TEXT: Regex = Regex::new(
        r"(\d{1,3}(?:[.,\s\u{00a0}]\d{3})+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?)\s*(?:€|EUR|euros)?"
    ).unwrap();

    pub static ref PERCENT_IN_TEXT: Regex = Regex::new(r"(\d{1,3}(?:[.,]\d{1,2})?)\s*%").unwrap();

    // Labelled values. Amount captures stay on one line.
    pub static ref NOTARY_LABEL: Regex = Regex::new(
        r"(?i)(?:notari[oa]\s*:\s*|ante\s+m[ií],?\s+)(?:(?:d\.|don|doña|dña\.)\s+)?([A-ZÁÉÍÓÚÑ][^,\n]*)"
    ).unwrap();

    pub static ref PROTOCOL_LABEL: Regex = Regex::new(
        r"(?i)(?:n[úu]mero\s+de\s+protocolo|protocolo(?:\s+n[º°o.]*)?)\s*[:\-]?\s*(\d[\d.]*\d|\d)"
    ).unwrap();

    pub static ref DEED_DATE_LABEL: Regex = Regex::new(
        r"(?i)(?:\ben\s+[^,\n]+,\s*a\s+|fecha(?:\s+de\s+(?:la\s+)?escritura)?\s*:\s*)([^\n]+)"
    ).unwrap();

    pub static ref ADDRESS_LABEL: Regex = Regex::new(
        r"(?i)(?:situad[ao]\s+en|sit[ao]\s+en|domicilio(?:\s+del\s+inmueble)?\s*:|direcci[óo]n(?:\s+del\s+inmueble)?\s*:)\s*([^\n;]+)"
    ).unwrap();

    pub static ref PROPERTY_TYPE_LABEL: Regex = Regex::new(
        r"(?i)\b(vivienda|piso|local\s+comercial|local|plaza\s+de\s+garaje|garaje|trastero|solar|nave\s+industrial|finca\s+r[úu]stica)\b"
    ).unwrap();

    pub static ref PROPERTY_NATURE_LABEL: Regex = Regex::new(
        r"(?i)naturaleza(?:\s+del\s+(?:bien|inmueble))?\s*:\s*([^\n]+)"
    ).unwrap();

    pub static ref TRANSFEROR_SHARES_LABEL: Regex = Regex::new(
        r"(?i)(?:coeficientes?|porcentajes?|cuotas?)\s+(?:de\s+)?(?:los\s+)?transmitentes?\s*:\s*([^\n]+)"
    ).unwrap();

    pub static ref BUYER_SECTION: Regex = Regex::new(
        r"(?i)(?:parte\s+compradora|\bcompradora?\b|\badquirente)[\s:,]*"
    ).unwrap();

    pub static ref SELLER_SECTION: Regex = Regex::new(
        r"(?i)(?:parte\s+vendedora|\bvendedora?\b|\btransmitente)[\s:,]*"
    ).unwrap();

    pub static ref TAXPAYER_SECTION: Regex = Regex::new(
        r"(?i)(?:sujeto\s+pasivo|obligado\s+tributario|\bcontribuyente)[\s:,]*"
    ).unwrap();

    // Party name right after a section header, up to the identifier
    pub static ref PARTY_NAME: Regex = Regex::new(
        r"(?i)^(?:(?:d\.|don|doña|dña\.|la\s+mercantil|la\s+sociedad)\s+)?([A-ZÁÉÍÓÚÑ][A-Z0-9ÁÉÍÓÚÑÜ.&' \-]*?)\s*(?:,|\n|(?:con\s+)?\b(?:DNI|NIE|NIF|CIF)\b|$)"
    ).unwrap();

    pub static ref PRICE_LABEL: Regex = Regex::new(
        r"(?i)(?:por\s+el\s+precio\s+de|precio(?:\s+de\s+(?:la\s+)?(?:compraventa|venta))?)\s*:?\s*(\d[\d. \u{00a0},]*\d|\d)"
    ).unwrap();

    pub static ref ACCRUAL_DATE_LABEL: Regex = Regex::new(
        r"(?i)fecha\s+(?:de\s+|del\s+)?devengo\s*:?\s*([^\n]+)"
    ).unwrap();

    pub static ref LIQUIDATION_DATE_LABEL: Regex = Regex::new(
        r"(?i)fecha\s+(?:de\s+)?(?:liquidaci[óo]n|presentaci[óo]n|autoliquidaci[óo]n|ingreso)\s*:?\s*([^\n]+)"
    ).unwrap();

    pub static ref DECLARED_VALUE_LABEL: Regex = Regex::new(
        r"(?i)valor\s+(?:declarado|real)\s*:?\s*(\d[\d. \u{00a0},]*\d|\d)"
    ).unwrap();

    pub static ref PERCENTAGE_LABEL: Regex = Regex::new(
        r"(?i)(?:porcentaje|%)\s+(?:transmitido|adquirido)\s*:?\s*(\d{1,3}(?:[.,]\d{1,2})?)"
    ).unwrap();

    pub static ref TAXABLE_BASE_LABEL: Regex = Regex::new(
        r"(?i)base\s+imponible\s*:?\s*(\d[\d. \u{00a0},]*\d|\d)"
    ).unwrap();

    pub static ref TAX_RATE_LABEL: Regex = Regex::new(
        r"(?i)tipo\s+(?:impositivo|de\s+gravamen|aplicable)\s*:?\s*(\d{1,2}(?:[.,]\d{1,2})?)"
    ).unwrap();

    pub static ref TAX_DUE_LABEL: Regex = Regex::new(
        r"(?i)(?:total\s+a\s+ingresar|cuota(?:\s+tributaria|\s+a\s+ingresar)?)\s*:?\s*(\d[\d. \u{00a0},]*\d|\d)"
    ).unwrap();
}
