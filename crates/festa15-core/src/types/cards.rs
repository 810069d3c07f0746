//! The card deck shown on the single page.
//!
//! Which cards render is data, not scattered conditionals: every card
//! declares the segments that see it, and the engine just filters.

use super::Segment;

/// Every card the page can show. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardKind {
    EventDetails,
    Rsvp,
    Photos,
    Chat,
    Admin,
}

/// Static description of one card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardSpec {
    pub kind: CardKind,
    pub title: &'static str,
    /// Segments that see this card.
    pub segments: &'static [Segment],
}

const ALL_SEGMENTS: &[Segment] = &[Segment::Young, Segment::Adult, Segment::Admin];
const GUEST_SEGMENTS: &[Segment] = &[Segment::Young, Segment::Adult];
const ADMIN_ONLY: &[Segment] = &[Segment::Admin];

static EVENT_DETAILS: CardSpec = CardSpec {
    kind: CardKind::EventDetails,
    title: "Detalhes da Festa",
    segments: ALL_SEGMENTS,
};

static RSVP: CardSpec = CardSpec {
    kind: CardKind::Rsvp,
    title: "Confirme sua Presença",
    segments: GUEST_SEGMENTS,
};

static PHOTOS: CardSpec = CardSpec {
    kind: CardKind::Photos,
    title: "Galeria de Fotos",
    segments: ALL_SEGMENTS,
};

static CHAT: CardSpec = CardSpec {
    kind: CardKind::Chat,
    title: "Mural de Recados",
    segments: ALL_SEGMENTS,
};

static ADMIN: CardSpec = CardSpec {
    kind: CardKind::Admin,
    title: "Painel do Administrador",
    segments: ADMIN_ONLY,
};

impl CardKind {
    /// Page order, top to bottom.
    pub const ALL: [CardKind; 5] = [
        CardKind::EventDetails,
        CardKind::Rsvp,
        CardKind::Photos,
        CardKind::Chat,
        CardKind::Admin,
    ];

    pub fn spec(&self) -> &'static CardSpec {
        match self {
            CardKind::EventDetails => &EVENT_DETAILS,
            CardKind::Rsvp => &RSVP,
            CardKind::Photos => &PHOTOS,
            CardKind::Chat => &CHAT,
            CardKind::Admin => &ADMIN,
        }
    }

    pub fn title(&self) -> &'static str {
        self.spec().title
    }

    pub fn visible_to(&self, segment: Segment) -> bool {
        self.spec().segments.contains(&segment)
    }

    /// The deck one segment sees, in page order.
    pub fn for_segment(segment: Segment) -> Vec<CardKind> {
        Self::ALL
            .into_iter()
            .filter(|card| card.visible_to(segment))
            .collect()
    }
}
