use super::pdf::{Font, PdfCanvas, MARGIN, PAGE_WIDTH};
use super::table::{wrap_text, Align, Column, Table};
use super::{format_amount, format_fcfa, DocumentRenderer, RenderResult};
use crate::certificates::CertificateDocument;
use crate::config::SchoolConfig;
use crate::directory::ClassRoster;
use crate::ledger::DailyReport;
use crate::model::Sex;
use crate::reconciliation::Statement;

const BODY_SIZE: f32 = 11.0;
const BODY_LEADING: f32 = 16.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;

/// A4 documents with the school letterhead.
pub struct PdfRenderer {
    school: SchoolConfig,
}

impl PdfRenderer {
    pub fn new(school: SchoolConfig) -> Self {
        Self { school }
    }

    fn letterhead(&self, canvas: &mut PdfCanvas) {
        let y = canvas.cursor();
        canvas.text_centered(y - 12.0, Font::Bold, 14.0, &self.school.name);
        canvas.text_centered(y - 28.0, Font::Regular, 10.0, &self.school.motto);
        canvas.line(MARGIN, y - 38.0, PAGE_WIDTH - MARGIN, y - 38.0);
        canvas.advance(58.0);
    }

    fn title(&self, canvas: &mut PdfCanvas, title: &str) {
        let y = canvas.cursor();
        canvas.text_centered(y - 14.0, Font::Bold, 14.0, title);
        canvas.advance(30.0);
    }

    /// A label in bold followed by its value on the same line.
    fn field(&self, canvas: &mut PdfCanvas, label: &str, value: &str) {
        let y = canvas.cursor() - BODY_SIZE;
        canvas.text(MARGIN, y, Font::Bold, BODY_SIZE, label);
        let x = MARGIN + Font::Bold.text_width(label, BODY_SIZE) + 4.0;
        canvas.text(x, y, Font::Regular, BODY_SIZE, value);
        canvas.advance(BODY_LEADING);
    }

    fn paragraph(&self, canvas: &mut PdfCanvas, text: &str) {
        for line in wrap_text(text, Font::Regular, BODY_SIZE, CONTENT_WIDTH) {
            if canvas.remaining() < BODY_LEADING {
                canvas.new_page();
            }
            let y = canvas.cursor() - BODY_SIZE;
            canvas.text(MARGIN, y, Font::Regular, BODY_SIZE, &line);
            canvas.advance(BODY_LEADING);
        }
    }

    fn section(&self, canvas: &mut PdfCanvas, heading: &str) {
        if canvas.remaining() < 60.0 {
            canvas.new_page();
        }
        canvas.advance(8.0);
        let y = canvas.cursor() - 12.0;
        canvas.text(MARGIN, y, Font::Bold, 12.0, heading);
        canvas.advance(20.0);
    }

    /// Two signature blocks, left and right, with an optional printed name
    /// under the left one.
    fn signatures(&self, canvas: &mut PdfCanvas, left: &str, right: &str, left_name: Option<&str>) {
        if canvas.remaining() < 100.0 {
            canvas.new_page();
        }
        canvas.advance(24.0);
        let y = canvas.cursor() - BODY_SIZE;
        canvas.text(MARGIN + 20.0, y, Font::Bold, BODY_SIZE, left);
        canvas.text_right(PAGE_WIDTH - MARGIN - 20.0, y, Font::Bold, BODY_SIZE, right);
        if let Some(name) = left_name {
            canvas.text(MARGIN + 20.0, y - 60.0, Font::Regular, BODY_SIZE, name);
        }
        canvas.advance(76.0);
    }
}

fn sex_suffix(sex: Option<Sex>, female: &'static str, male: &'static str, either: &'static str) -> &'static str {
    match sex {
        Some(Sex::F) => female,
        Some(Sex::M) => male,
        None => either,
    }
}

impl DocumentRenderer for PdfRenderer {
    fn certificate(&self, doc: &CertificateDocument) -> RenderResult {
        let mut canvas = PdfCanvas::new();
        let y = canvas.cursor();
        canvas.text(MARGIN, y - 10.0, Font::Bold, 10.0, "REPUBLIQUE DU BENIN");
        canvas.text(
            MARGIN,
            y - 23.0,
            Font::Regular,
            9.0,
            "MINISTERE DES ENSEIGNEMENTS MATERNEL ET PRIMAIRE",
        );
        canvas.text_right(
            PAGE_WIDTH - MARGIN,
            y - 10.0,
            Font::Regular,
            9.0,
            &format!("N° {}", doc.certificate.code),
        );
        canvas.advance(36.0);
        self.letterhead(&mut canvas);
        canvas.advance(10.0);
        self.title(&mut canvas, "CERTIFICAT DE SCOLARITE");
        canvas.advance(10.0);

        let c = &doc.certificate;
        let born = sex_suffix(doc.sexe, "née", "né", "né(e)");
        let enrolled = sex_suffix(doc.sexe, "inscrite", "inscrit", "inscrit(e)");
        let mut body = format!(
            "Je soussignée {}, Directrice de l'école primaire privée Arche du Millénium de {}, \
             certifie que l'élève {} {}",
            self.school.director_name, self.school.city, doc.nom, doc.prenom
        );
        if !doc.date_naissance.is_empty() {
            body.push_str(&format!(", {born} le {}", doc.date_naissance));
            if !doc.lieu_naissance.is_empty() {
                body.push_str(&format!(" à {}", doc.lieu_naissance));
            }
        }
        body.push_str(&format!(" est régulièrement {enrolled} dans mon établissement"));
        if let Some(m) = c.matricule.as_deref() {
            body.push_str(&format!(" sous le numéro matricule {m}"));
        }
        if !c.first_enrollment_date.is_empty() {
            body.push_str(&format!(" depuis le {}", c.first_enrollment_date));
        }
        body.push_str(&format!(
            " et poursuit actuellement ses études en classe de {}",
            c.class_name
        ));
        if !doc.annee_scolaire.is_empty() {
            body.push_str(&format!(" au titre de l'année scolaire {}", doc.annee_scolaire));
        }
        body.push('.');
        self.paragraph(&mut canvas, &body);
        canvas.advance(10.0);

        for label in ["Assiduité : ", "Conduite : ", "Travail : "] {
            self.field(&mut canvas, label, "..................................................");
        }
        canvas.advance(10.0);
        self.paragraph(
            &mut canvas,
            "En foi de quoi, le présent certificat lui est délivré pour servir et valoir ce que de droit.",
        );
        canvas.advance(20.0);

        let y = canvas.cursor() - BODY_SIZE;
        canvas.text_right(
            PAGE_WIDTH - MARGIN,
            y,
            Font::Regular,
            BODY_SIZE,
            &format!("Fait à {}, le {}", self.school.city, c.delivery_date),
        );
        canvas.advance(BODY_LEADING * 2.0);
        let y = canvas.cursor() - BODY_SIZE;
        canvas.text_right(PAGE_WIDTH - MARGIN, y, Font::Bold, BODY_SIZE, &self.school.director_title);
        canvas.advance(70.0);
        let y = canvas.cursor() - BODY_SIZE;
        canvas.text_right(PAGE_WIDTH - MARGIN, y, Font::Bold, BODY_SIZE, &self.school.director_name);
        canvas.finish()
    }

    fn daily_report(&self, report: &DailyReport) -> RenderResult {
        let mut canvas = PdfCanvas::new();
        self.letterhead(&mut canvas);
        self.title(&mut canvas, &format!("RAPPORT JOURNALIER -- {}", report.date));
        self.field(&mut canvas, "Chargé de caisse : ", &report.caissier);
        self.field(
            &mut canvas,
            "Solde d'ouverture : ",
            &format_fcfa(report.opening_balance),
        );

        self.section(&mut canvas, "Entrées de Caisse");
        let mut inflows = Table::new(vec![
            Column::new("N°", 30.0, Align::Center),
            Column::new("Référence", 110.0, Align::Left),
            Column::new("Élève", 140.0, Align::Left),
            Column::new("Motif", 135.0, Align::Left),
            Column::new("Montant", 100.0, Align::Right),
        ]);
        for (i, row) in report.entrees.iter().enumerate() {
            inflows.row([
                (i + 1).to_string(),
                row.reference.clone(),
                row.eleve.clone(),
                row.motif.clone(),
                format_amount(row.montant),
            ]);
        }
        inflows.draw(&mut canvas);
        canvas.advance(6.0);
        self.field(&mut canvas, "Total : ", &format_fcfa(report.total_inflows));

        self.section(&mut canvas, "Sorties de Caisse");
        let mut outflows = Table::new(vec![
            Column::new("N°", 30.0, Align::Center),
            Column::new("Référence", 110.0, Align::Left),
            Column::new("Catégorie", 140.0, Align::Left),
            Column::new("Motif", 135.0, Align::Left),
            Column::new("Montant", 100.0, Align::Right),
        ]);
        for (i, row) in report.sorties.iter().enumerate() {
            outflows.row([
                (i + 1).to_string(),
                row.reference.clone(),
                row.categorie.clone(),
                row.motif.clone(),
                format_amount(row.montant),
            ]);
        }
        outflows.draw(&mut canvas);
        canvas.advance(6.0);
        self.field(&mut canvas, "Total : ", &format_fcfa(report.total_outflows));

        self.section(&mut canvas, "Résumé final");
        self.field(&mut canvas, "Solde d'ouverture : ", &format_fcfa(report.opening_balance));
        self.field(&mut canvas, "Total des entrées : ", &format_fcfa(report.total_inflows));
        self.field(&mut canvas, "Total des sorties : ", &format_fcfa(report.total_outflows));
        self.field(&mut canvas, "Solde du jour : ", &format_fcfa(report.net));
        self.field(&mut canvas, "Solde de clôture : ", &format_fcfa(report.closing_balance));
        canvas.advance(10.0);
        self.paragraph(
            &mut canvas,
            &format!(
                "Certifié exact, sincère et conforme aux opérations de caisse du {}.",
                report.date
            ),
        );
        self.signatures(
            &mut canvas,
            "Le Fondé",
            "Le Secrétaire Comptable",
            Some(&report.fondateur),
        );
        canvas.finish()
    }

    fn statement(&self, statement: &Statement) -> RenderResult {
        let mut canvas = PdfCanvas::new();
        self.letterhead(&mut canvas);
        self.title(&mut canvas, "RELEVE DE COMPTE SCOLARITE");

        let e = &statement.eleve;
        self.field(&mut canvas, "Élève : ", &format!("{} {}", e.nom, e.prenom));
        self.field(&mut canvas, "Classe : ", &e.classe);
        self.field(&mut canvas, "Année scolaire : ", &e.annee_scolaire);
        if let Some(m) = e.matricule.as_deref() {
            self.field(&mut canvas, "Matricule : ", m);
        }

        self.section(&mut canvas, "Détail des paiements");
        let mut payments = Table::new(vec![
            Column::new("N°", 30.0, Align::Center),
            Column::new("Référence", 120.0, Align::Left),
            Column::new("Date", 80.0, Align::Center),
            Column::new("Motif", 185.0, Align::Left),
            Column::new("Montant", 100.0, Align::Right),
        ]);
        for (i, p) in statement.paiements.iter().enumerate() {
            payments.row([
                (i + 1).to_string(),
                p.reference.clone(),
                p.date.format("%d/%m/%Y").to_string(),
                p.motifs.clone().unwrap_or_default(),
                format_amount(p.montant),
            ]);
        }
        payments.draw(&mut canvas);

        self.section(&mut canvas, "Situation du compte");
        let mut situation = Table::new(vec![
            Column::new("Libellé", 365.0, Align::Left),
            Column::new("Montant", 150.0, Align::Right),
        ]);
        situation.row([
            "Montant total de scolarité (+ Frais obligatoires)".to_string(),
            format_fcfa(statement.expected_total),
        ]);
        situation.row(["Total déjà payé".to_string(), format_fcfa(statement.total_paid)]);
        situation.row(["Reste à payer".to_string(), format_fcfa(statement.remaining)]);
        situation.draw(&mut canvas);
        canvas.finish()
    }

    fn class_roster(&self, roster: &ClassRoster) -> RenderResult {
        let mut canvas = PdfCanvas::new();
        self.letterhead(&mut canvas);
        self.title(&mut canvas, "LISTE ALPHABÉTIQUE DES ÉLÈVES");
        self.field(&mut canvas, "Classe : ", &roster.classe);
        self.field(&mut canvas, "Date : ", &roster.date.format("%d/%m/%Y").to_string());
        self.field(&mut canvas, "Effectif : ", &roster.eleves.len().to_string());
        canvas.advance(6.0);

        let mut table = Table::new(vec![
            Column::new("N°", 35.0, Align::Center),
            Column::new("Matricule", 90.0, Align::Left),
            Column::new("Nom et prénoms", 250.0, Align::Left),
            Column::new("Sexe", 40.0, Align::Center),
            Column::new("Contact", 100.0, Align::Left),
        ]);
        for (i, s) in roster.eleves.iter().enumerate() {
            table.row([
                (i + 1).to_string(),
                s.matricule.clone().unwrap_or_default(),
                s.display_name(),
                s.sex.as_str().to_string(),
                s.contact.clone().unwrap_or_default(),
            ]);
        }
        table.draw(&mut canvas);
        canvas.finish()
    }
}
