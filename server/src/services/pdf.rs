use chrono::{DateTime, Utc};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("génération PDF échouée: {0}")]
    Render(#[from] printpdf::Error),
}

/// Données affichées sur une facture.
#[derive(Debug, Clone)]
pub struct InvoiceDocument {
    pub numero: String,
    pub date: DateTime<Utc>,
    pub client: String,
    pub client_email: String,
    pub transporteur: String,
    pub annonce_titre: String,
    pub trajet: String,
    pub devise: String,
    pub montant_ht: f64,
    pub tva_taux: f64,
    pub montant_tva: f64,
    pub montant_ttc: f64,
}

pub struct PdfService;

impl PdfService {
    pub fn new() -> Self {
        Self
    }

    pub fn render_invoice(&self, invoice: &InvoiceDocument) -> Result<Vec<u8>, PdfError> {
        let (doc, page, layer) =
            PdfDocument::new(format!("Facture {}", invoice.numero), Mm(210.0), Mm(297.0), "Facture");
        let layer = doc.get_page(page).get_layer(layer);
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;

        let devise = invoice.devise.to_uppercase();
        let mut writer = Lines::new(&layer, 270.0);

        writer.line(&bold, 20.0, "PRO-TRANS");
        writer.line(&regular, 10.0, "Plateforme de transport de marchandises");
        writer.gap(10.0);
        writer.line(&bold, 14.0, &format!("Facture n° {}", invoice.numero));
        writer.line(&regular, 10.0, &format!("Date: {}", invoice.date.format("%d/%m/%Y")));
        writer.gap(8.0);

        writer.line(&bold, 11.0, "Client");
        writer.line(&regular, 10.0, &invoice.client);
        writer.line(&regular, 10.0, &invoice.client_email);
        writer.gap(4.0);
        writer.line(&bold, 11.0, "Transporteur");
        writer.line(&regular, 10.0, &invoice.transporteur);
        writer.gap(8.0);

        writer.line(&bold, 11.0, "Prestation");
        writer.line(&regular, 10.0, &invoice.annonce_titre);
        writer.line(&regular, 10.0, &invoice.trajet);
        writer.gap(8.0);

        writer.line(
            &regular,
            11.0,
            &format!("Montant HT: {:.2} {}", invoice.montant_ht, devise),
        );
        writer.line(
            &regular,
            11.0,
            &format!(
                "TVA ({:.1} %): {:.2} {}",
                invoice.tva_taux * 100.0,
                invoice.montant_tva,
                devise
            ),
        );
        writer.line(
            &bold,
            12.0,
            &format!("Total TTC: {:.2} {}", invoice.montant_ttc, devise),
        );
        writer.gap(12.0);
        writer.line(&regular, 9.0, "Facture acquittée - paiement reçu par carte bancaire.");

        let bytes = doc.save_to_bytes()?;
        tracing::debug!("📄 Facture {} générée ({} octets)", invoice.numero, bytes.len());
        Ok(bytes)
    }
}

impl Default for PdfService {
    fn default() -> Self {
        Self::new()
    }
}

/// Écrit des lignes de haut en bas de la page.
struct Lines<'a> {
    layer: &'a PdfLayerReference,
    y: f32,
}

impl<'a> Lines<'a> {
    fn new(layer: &'a PdfLayerReference, top: f32) -> Self {
        Self { layer, y: top }
    }

    fn line(&mut self, font: &IndirectFontRef, size: f32, text: &str) {
        self.layer.use_text(text, size, Mm(20.0), Mm(self.y), font);
        self.y -= size * 0.5 + 2.0;
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }
}
