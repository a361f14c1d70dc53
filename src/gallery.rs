use crate::models::GeneratedImage;
use uuid::Uuid;

/// Newest-first collection of images produced in the current session.
#[derive(Debug, Default, Clone)]
pub struct Gallery {
    images: Vec<GeneratedImage>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_image_produced(&mut self, image: GeneratedImage) {
        log::debug!("Gallery: prepending image {} for prompt '{}'", image.id, image.prompt);
        self.images.insert(0, image);
    }

    /// Removes the image with `id`. Returns whether anything was removed.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.images.len();
        self.images.retain(|image| image.id != id);
        let removed = self.images.len() != before;
        if !removed {
            log::debug!("Gallery: no image with id {}, nothing removed", id);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }

    pub fn images(&self) -> &[GeneratedImage] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageData;
    use chrono::Utc;

    fn image(prompt: &str) -> GeneratedImage {
        GeneratedImage {
            id: Uuid::new_v4(),
            prompt: prompt.to_string(),
            image_data: ImageData::Url(format!("https://img.example/{}.png", prompt)),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn newest_first() {
        let mut gallery = Gallery::new();
        let first = image("a cat");
        let second = image("a dog");
        gallery.on_image_produced(first.clone());
        gallery.on_image_produced(second.clone());

        assert_eq!(gallery.len(), 2);
        assert_eq!(gallery.images()[0], second);
        assert_eq!(gallery.images()[1], first);
    }

    #[test]
    fn remove_unknown_id_is_noop() {
        let mut gallery = Gallery::new();
        let kept = image("a cat");
        gallery.on_image_produced(kept.clone());

        assert!(!gallery.remove(Uuid::new_v4()));
        assert_eq!(gallery.images(), &[kept.clone()]);

        assert!(gallery.remove(kept.id));
        assert!(gallery.is_empty());
    }

    #[test]
    fn clear_empties() {
        let mut gallery = Gallery::new();
        gallery.on_image_produced(image("one"));
        gallery.on_image_produced(image("two"));
        gallery.clear();
        assert!(gallery.is_empty());
    }
}
