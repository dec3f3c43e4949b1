//! `.xlsx` export of enriched products

use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};
use thiserror::Error;

use crate::domain::EnrichedProduct;

pub const SHEET_NAME: &str = "Productos";

pub const HEADERS: [&str; 14] = [
    "Producto",
    "Precio Original",
    "Precio con Descuento",
    "Descuento (%)",
    "Vendedor",
    "Estado del Producto",
    "Cantidad Vendida",
    "Cuotas Disponibles",
    "Meses sin Intereses",
    "Envío Gratis",
    "Cantidad Disponible",
    "URL del Producto",
    "Categoría",
    "Imagen",
];

const TITLE_COLUMN: u16 = 0;
const URL_COLUMN: u16 = 11;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Spreadsheet generation failed: {0}")]
    Xlsx(#[from] XlsxError),
}

/// Serializes records into an in-memory workbook with a styled header row
pub fn export_products(records: &[EnrichedProduct]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0x1E_88E5))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_border(FormatBorder::Thin);

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (col, header) in (0u16..).zip(HEADERS) {
        worksheet.write_string_with_format(0, col, header, &header_format)?;
        let width = match col {
            URL_COLUMN => 50.0,
            TITLE_COLUMN => 40.0,
            _ => 20.0,
        };
        worksheet.set_column_width(col, width)?;
    }
    worksheet.set_freeze_panes(1, 0)?;

    for (row, record) in (1u32..).zip(records) {
        write_record(worksheet, row, record)?;
    }

    tracing::debug!(rows = records.len(), "Spreadsheet generated");
    Ok(workbook.save_to_buffer()?)
}

fn write_record(sheet: &mut Worksheet, row: u32, record: &EnrichedProduct) -> Result<(), XlsxError> {
    let p = &record.product;
    sheet.write_string(row, 0, &p.title)?;
    sheet.write_number(row, 1, p.original_price)?;
    sheet.write_number(row, 2, p.discounted_price)?;
    sheet.write_number(row, 3, p.discount_percentage)?;
    sheet.write_string(row, 4, &p.seller)?;
    sheet.write_string(row, 5, p.condition.label())?;
    sheet.write_number(row, 6, record.units_sold as f64)?;
    sheet.write_number(row, 7, f64::from(p.installments))?;
    sheet.write_number(row, 8, f64::from(p.interest_free_months))?;
    sheet.write_string(row, 9, free_shipping_label(p.free_shipping))?;
    sheet.write_number(row, 10, p.available_quantity as f64)?;
    sheet.write_string(row, URL_COLUMN, &p.url)?;
    sheet.write_string(row, 12, &p.category_id)?;
    sheet.write_string(row, 13, &p.thumbnail_url)?;
    Ok(())
}

const fn free_shipping_label(free_shipping: Option<bool>) -> &'static str {
    match free_shipping {
        Some(true) => "Sí",
        Some(false) => "No",
        None => "N/A",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_product;
    use std::io::{Cursor, Read};

    fn archive_entry(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entry = archive.by_name(name).unwrap();
        let mut xml = String::new();
        entry.read_to_string(&mut xml).unwrap();
        xml
    }

    #[test]
    fn export_produces_zip_container() {
        let records = vec![
            sample_product("https://shop.test/a", "Laptop", 10),
            sample_product("https://shop.test/b", "Mouse", 0),
        ];

        let bytes = export_products(&records).unwrap();

        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn empty_export_still_has_header_sheet() {
        let bytes = export_products(&[]).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn first_sheet_is_named_and_carries_the_header_row() {
        let bytes = export_products(&[sample_product("https://shop.test/a", "Laptop", 3)]).unwrap();

        let workbook = archive_entry(&bytes, "xl/workbook.xml");
        let first_sheet = workbook.find("<sheet ").unwrap();
        assert!(workbook[first_sheet..].starts_with(&format!("<sheet name=\"{SHEET_NAME}\"")));

        let strings = archive_entry(&bytes, "xl/sharedStrings.xml");
        for header in HEADERS {
            assert!(strings.contains(&format!(">{header}<")), "missing header {header}");
        }
        assert!(strings.contains(">Laptop<"));
    }

    #[test]
    fn shipping_labels_cover_tri_state() {
        assert_eq!(free_shipping_label(Some(true)), "Sí");
        assert_eq!(free_shipping_label(Some(false)), "No");
        assert_eq!(free_shipping_label(None), "N/A");
    }
}
