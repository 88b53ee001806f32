use assert_matches::assert_matches;

use biodata_ingest::domain::{Category, Reference, ReferenceId, RegisteredItem};
use biodata_ingest::error::IngestError;

#[test]
fn parse_reference_id_valid() {
    let id: ReferenceId = " 42 ".parse().unwrap();
    assert_eq!(id.value(), 42);
    assert_eq!(id.to_string(), "42");
}

#[test]
fn parse_reference_id_invalid() {
    for value in ["", "abc", "-1", "1.5", "12a"] {
        let err = value.parse::<ReferenceId>().unwrap_err();
        assert_matches!(err, IngestError::InvalidReferenceId(_));
    }
}

#[test]
fn category_round_trips_through_name() {
    let categories = [
        Category::Reference,
        Category::Vcf,
        Category::Gene,
        Category::Bam,
        Category::Seg,
        Category::Wig,
        Category::Bed,
        Category::Vg,
        Category::Maf,
        Category::Index,
    ];
    for category in categories {
        let parsed: Category = category.as_str().parse().unwrap();
        assert_eq!(parsed, category);
    }
    assert_eq!("VCF".parse::<Category>().unwrap(), Category::Vcf);
}

#[test]
fn unknown_category_rejected() {
    let err = "fasta".parse::<Category>().unwrap_err();
    assert_matches!(err, IngestError::UnknownCategory(ref name) if name == "fasta");
}

#[test]
fn delete_id_fields() {
    assert_eq!(Category::Vcf.id_field().unwrap(), "vcfFileId");
    assert_eq!(Category::Gene.id_field().unwrap(), "geneFileId");
    assert_eq!(Category::Bam.id_field().unwrap(), "bamFileId");
    assert_eq!(Category::Seg.id_field().unwrap(), "segFileId");
    assert_eq!(Category::Wig.id_field().unwrap(), "wigFileId");
    assert_eq!(Category::Bed.id_field().unwrap(), "bedFileId");
    assert_eq!(Category::Vg.id_field().unwrap(), "vgFileId");
    assert_eq!(Category::Reference.id_field().unwrap(), "referenceId");
    assert_matches!(
        Category::Maf.id_field(),
        Err(IngestError::UnsupportedCategory(_))
    );
    assert_matches!(
        Category::Index.id_field(),
        Err(IngestError::UnsupportedCategory(_))
    );
}

#[test]
fn only_bam_requires_index() {
    assert!(Category::Bam.requires_index());
    assert!(!Category::Vcf.requires_index());
    assert!(!Category::Bed.requires_index());
}

#[test]
fn reference_payload_decodes() {
    let reference: Reference =
        serde_json::from_str(r#"{"bioDataItemId":11,"id":3,"name":"GRCh38","size":100}"#)
            .unwrap();
    assert_eq!(reference.bio_data_item_id, 11);
    assert_eq!(reference.registration_id(ReferenceId::new(9)), 3);

    let bare: Reference = serde_json::from_str(r#"{"bioDataItemId":11}"#).unwrap();
    assert_eq!(bare.registration_id(ReferenceId::new(9)), 9);
}

#[test]
fn registered_item_requires_bio_data_item_id() {
    let item: RegisteredItem =
        serde_json::from_str(r#"{"id":5,"bioDataItemId":12,"name":"sample.vcf"}"#).unwrap();
    assert_eq!(item.id, Some(5));
    assert!(serde_json::from_str::<RegisteredItem>(r#"{"id":5,"name":"x"}"#).is_err());
}
