//! Image delivery URL transforms.

use url::Url;

/// Output format for a transformed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
  Gif,
  Png,
  Jpg,
  Pjpg,
  Webp,
  Webpll,
  Webply,
}

impl ImageFormat {
  fn as_str(&self) -> &'static str {
    match self {
      Self::Gif => "gif",
      Self::Png => "png",
      Self::Jpg => "jpg",
      Self::Pjpg => "pjpg",
      Self::Webp => "webp",
      Self::Webpll => "webpll",
      Self::Webply => "webply",
    }
  }
}

/// How the image fits the requested box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
  Bounds,
  Crop,
}

/// Builds an asset URL with transform parameters appended.
///
/// Parameters keep the order they were set in; setting one twice replaces
/// the earlier value.
#[derive(Debug, Clone)]
pub struct ImageTransform {
  url: String,
  params: Vec<(&'static str, String)>,
}

impl ImageTransform {
  pub fn new(url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      params: Vec::new(),
    }
  }

  pub fn width(self, width: u32) -> Self {
    self.set("width", width.to_string())
  }

  pub fn height(self, height: u32) -> Self {
    self.set("height", height.to_string())
  }

  pub fn fit(self, fit: Fit) -> Self {
    let value = match fit {
      Fit::Bounds => "bounds",
      Fit::Crop => "crop",
    };
    self.set("fit", value.to_string())
  }

  pub fn format(self, format: ImageFormat) -> Self {
    self.set("format", format.as_str().to_string())
  }

  /// Compression quality, 1 to 100.
  pub fn quality(self, quality: u8) -> Self {
    self.set("quality", quality.clamp(1, 100).to_string())
  }

  /// Let the CDN pick the best format for the client (`auto=webp`).
  pub fn auto(self) -> Self {
    self.set("auto", "webp".to_string())
  }

  /// Crop to `width` x `height`.
  pub fn crop(self, width: u32, height: u32) -> Self {
    self.set("crop", format!("{},{}", width, height))
  }

  /// Device pixel ratio; needs width or height to take effect.
  pub fn dpr(self, dpr: f32) -> Self {
    self.set("dpr", trim_float(dpr))
  }

  /// Blur radius, 1 to 1000.
  pub fn blur(self, radius: u32) -> Self {
    self.set("blur", radius.clamp(1, 1000).to_string())
  }

  /// The transformed URL. Query parameters already on the URL are kept.
  pub fn build(&self) -> String {
    if self.params.is_empty() {
      return self.url.clone();
    }

    match Url::parse(&self.url) {
      Ok(mut url) => {
        {
          let mut pairs = url.query_pairs_mut();
          for (key, value) in &self.params {
            pairs.append_pair(key, value);
          }
        }
        url.to_string()
      }
      // Relative or otherwise unparsable: append by hand
      Err(_) => {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        let query = self
          .params
          .iter()
          .map(|(k, v)| format!("{}={}", k, v))
          .collect::<Vec<_>>()
          .join("&");
        format!("{}{}{}", self.url, separator, query)
      }
    }
  }

  fn set(mut self, key: &'static str, value: String) -> Self {
    match self.params.iter_mut().find(|(k, _)| *k == key) {
      Some(slot) => slot.1 = value,
      None => self.params.push((key, value)),
    }
    self
  }
}

fn trim_float(value: f32) -> String {
  let s = format!("{:.2}", value);
  s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  const ASSET: &str = "https://images.example.io/v3/assets/blt1/blt2/photo.jpg";

  #[test]
  fn test_no_transform_returns_url() {
    assert_eq!(ImageTransform::new(ASSET).build(), ASSET);
  }

  #[test]
  fn test_params_in_order() {
    let url = ImageTransform::new(ASSET)
      .width(300)
      .height(200)
      .fit(Fit::Crop)
      .format(ImageFormat::Webp)
      .build();
    assert_eq!(
      url,
      format!("{}?width=300&height=200&fit=crop&format=webp", ASSET)
    );
  }

  #[test]
  fn test_existing_query_is_preserved() {
    let url = ImageTransform::new(format!("{}?environment=prod", ASSET))
      .quality(250)
      .build();
    assert_eq!(url, format!("{}?environment=prod&quality=100", ASSET));
  }

  #[test]
  fn test_setting_twice_replaces() {
    let url = ImageTransform::new(ASSET).width(100).width(50).dpr(2.0).build();
    assert_eq!(url, format!("{}?width=50&dpr=2", ASSET));
  }

  #[test]
  fn test_relative_url() {
    let url = ImageTransform::new("/assets/photo.jpg")
      .crop(10, 20)
      .auto()
      .build();
    assert_eq!(url, "/assets/photo.jpg?crop=10,20&auto=webp");
  }
}
